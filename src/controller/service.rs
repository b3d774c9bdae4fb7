//! Network identity.

use crate::resources::{ObjectMeta, Resource, Service, ServiceSpec};
use crate::workflow::WorkflowInstance;

/// Headless service selecting the instance's pods. Gives registry replicas
/// their stable per-ordinal names.
pub fn headless_service(instance: &WorkflowInstance) -> Resource {
    Resource::Service(Service {
        metadata: ObjectMeta::namespaced(instance.service_name(), instance.namespace())
            .with_labels(instance.selector()),
        spec: ServiceSpec {
            cluster_ip: "None".to_string(),
            selector: instance.selector(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;
    use crate::workflow::parse_workflow;

    #[test]
    fn test_service_is_headless() {
        let wf = parse_workflow("metadata:\n  name: wf1\n  namespace: ns1\n").unwrap();
        let Resource::Service(service) = headless_service(&wf) else {
            panic!("expected a service");
        };
        assert_eq!(service.spec.cluster_ip, "None");
        assert_eq!(service.spec.selector["app"], "wf1");
        assert_eq!(service.metadata.name, "wf1");
        assert_eq!(
            headless_service(&wf).key().to_string(),
            format!("{} ns1/wf1", ResourceKind::Service)
        );
    }
}
