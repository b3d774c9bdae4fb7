//! Derived resource names and registry addressing.
//!
//! Nothing here is stored. Every lookup recomputes names from the instance
//! identity, so the same (name, namespace, registry policy) always yields the
//! same names.

use std::collections::BTreeMap;

use super::types::WorkflowInstance;

/// Port used by the in-cluster registry when none is set.
pub const DEFAULT_REGISTRY_PORT: u16 = 5000;

/// Name of the registry stateful set when none is set.
pub const DEFAULT_REGISTRY_NAME: &str = "registry";

/// Label key binding owned objects to a workflow instance.
pub const SELECTOR_LABEL: &str = "app";

impl WorkflowInstance {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Name of the manager deployment and its configuration object.
    pub fn manager_name(&self) -> String {
        format!("{}-manager", self.metadata.name)
    }

    pub fn cluster_role_name(&self) -> String {
        format!("{}-cluster-roles", self.metadata.name)
    }

    pub fn role_name(&self) -> String {
        format!("{}-roles", self.metadata.name)
    }

    /// Headless service and service account share the instance name.
    pub fn service_name(&self) -> &str {
        &self.metadata.name
    }

    pub fn service_account_name(&self) -> &str {
        &self.metadata.name
    }

    /// Name of the registry stateful set.
    pub fn registry_name(&self) -> &str {
        if self.spec.registry.name.is_empty() {
            DEFAULT_REGISTRY_NAME
        } else {
            &self.spec.registry.name
        }
    }

    /// Label set selecting every object owned by this instance.
    pub fn selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(SELECTOR_LABEL.to_string(), self.metadata.name.clone())])
    }

    /// True when the operator provisions the registry.
    pub fn has_in_cluster_registry(&self) -> bool {
        self.spec.registry.host.is_empty()
    }

    /// Effective registry address.
    ///
    /// In-cluster: `<registry>-0.<name>.<namespace>.svc.cluster.local:<port>`,
    /// the ordinal-0 replica of the registry stateful set behind the headless
    /// service. External: `host` when the port is 0, else `host:port`.
    pub fn registry_address(&self) -> String {
        let registry = &self.spec.registry;
        if !self.has_in_cluster_registry() {
            if registry.port == 0 {
                return registry.host.clone();
            }
            return format!("{}:{}", registry.host, registry.port);
        }

        let port = if registry.port == 0 {
            DEFAULT_REGISTRY_PORT
        } else {
            registry.port
        };
        format!(
            "{}-0.{}.{}.svc.cluster.local:{}",
            self.registry_name(),
            self.metadata.name,
            self.metadata.namespace,
            port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{InstanceMeta, RegistryPolicy, WorkflowSpec};

    fn instance(host: &str, port: u16) -> WorkflowInstance {
        WorkflowInstance {
            api_version: "stagewright.dev/v1alpha1".into(),
            kind: "Workflow".into(),
            metadata: InstanceMeta {
                name: "wf1".into(),
                namespace: "ns1".into(),
                uid: None,
            },
            spec: WorkflowSpec {
                registry: RegistryPolicy {
                    host: host.into(),
                    port,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_in_cluster_address_defaults_port() {
        let wf = instance("", 0);
        assert!(wf.has_in_cluster_registry());
        assert_eq!(
            wf.registry_address(),
            "registry-0.wf1.ns1.svc.cluster.local:5000"
        );
    }

    #[test]
    fn test_in_cluster_address_keeps_port() {
        let wf = instance("", 5001);
        assert_eq!(
            wf.registry_address(),
            "registry-0.wf1.ns1.svc.cluster.local:5001"
        );
    }

    #[test]
    fn test_external_address() {
        assert_eq!(instance("ext.example.com", 0).registry_address(), "ext.example.com");
        assert_eq!(
            instance("ext.example.com", 9000).registry_address(),
            "ext.example.com:9000"
        );
        assert!(!instance("ext.example.com", 0).has_in_cluster_registry());
    }

    #[test]
    fn test_names_are_deterministic() {
        let a = instance("", 0);
        let b = instance("", 0);
        assert_eq!(a.manager_name(), "wf1-manager");
        assert_eq!(a.cluster_role_name(), "wf1-cluster-roles");
        assert_eq!(a.role_name(), "wf1-roles");
        assert_eq!(a.manager_name(), b.manager_name());
        assert_eq!(a.registry_address(), b.registry_address());
        assert_eq!(a.selector(), b.selector());
        assert_eq!(a.selector()["app"], "wf1");
    }
}
