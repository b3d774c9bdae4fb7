//! Access control objects. Pure data.

use crate::resources::{
    ClusterRole, ClusterRoleBinding, ObjectMeta, PolicyRule, Resource, Role, RoleBinding, RoleRef,
    ServiceAccount, Subject,
};
use crate::workflow::WorkflowInstance;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn subject(instance: &WorkflowInstance) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: instance.service_account_name().to_string(),
        namespace: instance.namespace().to_string(),
    }
}

pub fn service_account(instance: &WorkflowInstance) -> Resource {
    Resource::ServiceAccount(ServiceAccount {
        metadata: ObjectMeta::namespaced(instance.service_account_name(), instance.namespace())
            .with_labels(instance.selector()),
    })
}

/// Read access to node inventory.
pub fn cluster_role(instance: &WorkflowInstance) -> Resource {
    Resource::ClusterRole(ClusterRole {
        metadata: ObjectMeta::cluster(instance.cluster_role_name()).with_labels(instance.selector()),
        rules: vec![PolicyRule::new(&[""], &["nodes"], &["list", "get", "watch"])],
    })
}

pub fn cluster_role_binding(instance: &WorkflowInstance) -> Resource {
    Resource::ClusterRoleBinding(ClusterRoleBinding {
        metadata: ObjectMeta::cluster(instance.cluster_role_name()).with_labels(instance.selector()),
        subjects: vec![subject(instance)],
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: instance.cluster_role_name(),
        },
    })
}

/// Full lifecycle on the pods, jobs, and config objects the manager drives.
pub fn role(instance: &WorkflowInstance) -> Resource {
    Resource::Role(Role {
        metadata: ObjectMeta::namespaced(instance.role_name(), instance.namespace())
            .with_labels(instance.selector()),
        rules: vec![PolicyRule::new(
            &["", "batch"],
            &["pods", "jobs", "configmaps", "jobs/status"],
            &["list", "get", "patch", "create", "delete", "watch"],
        )],
    })
}

pub fn role_binding(instance: &WorkflowInstance) -> Resource {
    Resource::RoleBinding(RoleBinding {
        metadata: ObjectMeta::namespaced(instance.role_name(), instance.namespace())
            .with_labels(instance.selector()),
        subjects: vec![subject(instance)],
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: instance.role_name(),
        },
    })
}

/// Every access control object, in creation order.
pub fn access_control(instance: &WorkflowInstance) -> Vec<Resource> {
    vec![
        service_account(instance),
        cluster_role(instance),
        cluster_role_binding(instance),
        role(instance),
        role_binding(instance),
    ]
}
