//! In-cluster artifact registry.

use std::collections::BTreeMap;

use crate::resources::{
    Container, ObjectMeta, PodSpec, PodTemplate, Resource, StatefulSet, StatefulSetSpec,
};
use crate::workflow::WorkflowInstance;

use super::INSTANCE_TYPE_LABEL;

/// Stable-identity replica set for the registry. Replica 0 is reachable at
/// `<registry>-0.<name>.<namespace>.svc.cluster.local` through the headless
/// service.
pub fn registry_stateful_set(instance: &WorkflowInstance) -> Resource {
    let registry = &instance.spec.registry;
    let selector = instance.selector();

    let mut node_selector = BTreeMap::new();
    if !registry.node_selector.is_empty() {
        node_selector.insert(
            INSTANCE_TYPE_LABEL.to_string(),
            registry.node_selector.clone(),
        );
    }

    Resource::StatefulSet(StatefulSet {
        metadata: ObjectMeta::namespaced(instance.registry_name(), instance.namespace())
            .with_labels(selector.clone()),
        spec: StatefulSetSpec {
            service_name: instance.service_name().to_string(),
            replicas: registry.replicas,
            selector: selector.clone(),
            template: PodTemplate {
                labels: selector,
                spec: PodSpec {
                    subdomain: instance.service_name().to_string(),
                    containers: vec![Container {
                        name: "registry".to_string(),
                        image: registry.image.clone(),
                        image_pull_policy: registry.pull_policy.clone(),
                        command: Vec::new(),
                        volume_mounts: Vec::new(),
                    }],
                    node_selector,
                    ..Default::default()
                },
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::workflow::{parse_workflow, validate_workflow};

    fn stateful_set(registry: &str) -> StatefulSet {
        let yaml = format!(
            "metadata:\n  name: wf1\n  namespace: ns1\nspec:\n  cluster:\n    maxSize: 1\n  workflow:\n    completed: 1\n  manager:\n    nodeSelector: c5.large\n{}",
            registry
        );
        let wf = validate_workflow(&parse_workflow(&yaml).unwrap(), &Config::default()).unwrap();
        match registry_stateful_set(&wf) {
            Resource::StatefulSet(set) => set,
            other => panic!("expected a stateful set, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_registry_defaults() {
        let set = stateful_set("");
        assert_eq!(set.metadata.name, "registry");
        assert_eq!(set.spec.service_name, "wf1");
        assert_eq!(set.spec.replicas, 1);
        assert_eq!(set.spec.template.spec.hostname, None);
        assert_eq!(set.spec.template.spec.subdomain, "wf1");
        assert_eq!(
            set.spec.template.spec.containers[0].image,
            "ghcr.io/oras-project/registry:latest"
        );
        // The manager's selector never leaks onto the registry
        assert!(set.spec.template.spec.node_selector.is_empty());
    }

    #[test]
    fn test_registry_pods_are_named_by_ordinal() {
        let manifest = Resource::StatefulSet(stateful_set("")).to_manifest().unwrap();
        let pod = &manifest["spec"]["template"]["spec"];
        assert!(pod.get("hostname").is_none());
        assert_eq!(pod["subdomain"], "wf1");
        assert_eq!(manifest["spec"]["serviceName"], "wf1");
    }

    #[test]
    fn test_registry_uses_its_own_node_selector() {
        let set = stateful_set("  registry:\n    nodeSelector: m5.xlarge\n    replicas: 2\n");
        assert_eq!(
            set.spec.template.spec.node_selector[INSTANCE_TYPE_LABEL],
            "m5.xlarge"
        );
        assert_eq!(set.spec.replicas, 2);
    }
}
