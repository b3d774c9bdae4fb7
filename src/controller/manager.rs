//! Manager configuration object and deployment.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Result;
use crate::manager::manager_config_data;
use crate::resources::{
    ConfigMap, ConfigMapVolumeSource, Container, Deployment, DeploymentSpec, ObjectMeta, PodSpec,
    PodTemplate, Resource, Volume, VolumeMount,
};
use crate::workflow::WorkflowInstance;

use super::INSTANCE_TYPE_LABEL;

const CONFIG_VOLUME: &str = "manager-entrypoint";

/// Hostname of the manager pod under the instance's subdomain.
pub const MANAGER_HOSTNAME: &str = "manager";

/// Configuration object holding the entrypoint, workflow policy, and one
/// document per stage.
pub fn manager_config_map(instance: &WorkflowInstance, config: &Config) -> Result<Resource> {
    Ok(Resource::ConfigMap(ConfigMap {
        metadata: ObjectMeta::namespaced(instance.manager_name(), instance.namespace())
            .with_labels(instance.selector()),
        data: manager_config_data(instance, config)?,
    }))
}

/// Manager deployment: mounts the configuration object and runs its
/// entrypoint under the instance's service identity.
pub fn manager_deployment(instance: &WorkflowInstance, config: &Config) -> Resource {
    let manager = &instance.spec.manager;
    let selector = instance.selector();
    let mount_path = config.manager.mount_path.trim_end_matches('/');

    let mut node_selector = BTreeMap::new();
    if !manager.node_selector.is_empty() {
        node_selector.insert(INSTANCE_TYPE_LABEL.to_string(), manager.node_selector.clone());
    }

    let container = Container {
        name: "manager".to_string(),
        image: manager.image.clone(),
        image_pull_policy: manager.pull_policy.clone(),
        command: vec![
            "/bin/bash".to_string(),
            format!("{}/{}", mount_path, config.manager.entrypoint),
        ],
        volume_mounts: vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: format!("{}/", mount_path),
        }],
    };

    Resource::Deployment(Deployment {
        metadata: ObjectMeta::namespaced(instance.manager_name(), instance.namespace())
            .with_labels(selector.clone()),
        spec: DeploymentSpec {
            replicas: manager.replicas,
            selector: selector.clone(),
            template: PodTemplate {
                labels: selector,
                spec: PodSpec {
                    service_account_name: Some(instance.service_account_name().to_string()),
                    hostname: Some(MANAGER_HOSTNAME.to_string()),
                    subdomain: instance.service_name().to_string(),
                    containers: vec![container],
                    volumes: vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: ConfigMapVolumeSource {
                            name: instance.manager_name(),
                        },
                    }],
                    node_selector,
                },
            },
        },
    })
}
