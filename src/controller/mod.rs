//! Convergence controller.
//!
//! Creates whatever a workflow instance is missing, in dependency order:
//!
//! 1. Network identity: headless service
//! 2. Access control: service account, cluster role and binding, role and binding
//! 3. Registry: stable-identity replica set (in-cluster registry only)
//! 4. Manager: configuration object, then deployment
//!
//! Convergence is create-only. An object that exists is left untouched even
//! when the desired spec has drifted from it. Every pass re-reads the store;
//! nothing about existence is cached between passes.

mod manager;
mod rbac;
mod registry;
mod reporter;
mod service;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::resources::{set_owner_reference, ObjectKey, OwnerReference, Resource, ResourceKind};
use crate::store::ResourceStore;
use crate::workflow::{validate_workflow, WorkflowInstance};

pub use manager::{manager_config_map, manager_deployment, MANAGER_HOSTNAME};
pub use rbac::{
    access_control, cluster_role, cluster_role_binding, role, role_binding, service_account,
};
pub use registry::registry_stateful_set;
pub use reporter::{NoopReporter, Reporter, TracingReporter};
pub use service::headless_service;

/// Node label pinning pods to an instance type.
pub const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";

/// Convergence steps, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Network,
    AccessControl,
    Registry,
    Manager,
}

impl Step {
    pub const ORDER: [Step; 4] = [
        Step::Network,
        Step::AccessControl,
        Step::Registry,
        Step::Manager,
    ];
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Network => write!(f, "network"),
            Step::AccessControl => write!(f, "access-control"),
            Step::Registry => write!(f, "registry"),
            Step::Manager => write!(f, "manager"),
        }
    }
}

/// What one convergence pass did, in visit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub workflow: String,
    pub namespace: String,
    /// Objects this pass created
    pub created: Vec<ObjectKey>,
    /// Objects found present, including ones a concurrent pass created first
    pub present: Vec<ObjectKey>,
}

impl ConvergeReport {
    fn new(instance: &WorkflowInstance) -> Self {
        Self {
            workflow: instance.name().to_string(),
            namespace: instance.namespace().to_string(),
            created: Vec::new(),
            present: Vec::new(),
        }
    }

    /// True when the pass created nothing.
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty()
    }
}

/// Drives a store toward a workflow instance's desired state.
pub struct Converger {
    store: Arc<dyn ResourceStore>,
    config: Config,
    reporter: Arc<dyn Reporter>,
}

impl Converger {
    pub fn new(store: Arc<dyn ResourceStore>, config: Config) -> Self {
        Self {
            store,
            config,
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Attach an observer for convergence progress.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one convergence pass.
    ///
    /// Safe to call any number of times, from any partial state, and
    /// concurrently for the same instance. Validation runs before any store
    /// access. The first hard failure aborts the remaining steps and is
    /// returned for the caller to retry later.
    pub async fn converge(&self, desired: &WorkflowInstance) -> Result<ConvergeReport> {
        let started = Instant::now();
        let name = desired.metadata.name.as_str();

        let (instance, owner) = match Self::prepare(desired, &self.config) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reporter.failed(name, None, &e);
                return Err(e);
            }
        };

        let mut report = ConvergeReport::new(&instance);
        for step in Step::ORDER {
            if step == Step::Registry && !instance.has_in_cluster_registry() {
                debug!(
                    workflow = %name,
                    registry = %instance.registry_address(),
                    "External registry, skipping registry step"
                );
                continue;
            }

            self.reporter.step_started(name, step);
            if let Err(e) = self.run_step(step, &instance, &owner, &mut report).await {
                self.reporter.failed(name, Some(step), &e);
                return Err(e);
            }
        }

        self.reporter.converged(&report, started.elapsed());
        Ok(report)
    }

    fn prepare(
        desired: &WorkflowInstance,
        config: &Config,
    ) -> Result<(WorkflowInstance, OwnerReference)> {
        let instance = validate_workflow(desired, config)?;
        let owner = OwnerReference::for_workflow(&instance)?;
        Ok((instance, owner))
    }

    async fn run_step(
        &self,
        step: Step,
        instance: &WorkflowInstance,
        owner: &OwnerReference,
        report: &mut ConvergeReport,
    ) -> Result<()> {
        let name = instance.name();
        match step {
            Step::Network => {
                let service = headless_service(instance);
                let key = service.key();
                self.ensure(name, step, key, owner, report, move || Ok(service))
                    .await
            }
            Step::AccessControl => {
                for resource in access_control(instance) {
                    let key = resource.key();
                    self.ensure(name, step, key, owner, report, move || Ok(resource))
                        .await?;
                }
                Ok(())
            }
            Step::Registry => {
                let registry = registry_stateful_set(instance);
                let key = registry.key();
                self.ensure(name, step, key, owner, report, move || Ok(registry))
                    .await
            }
            Step::Manager => {
                // The payload is only assembled when the object is missing
                let key = ObjectKey::new(
                    ResourceKind::ConfigMap,
                    instance.manager_name(),
                    instance.namespace(),
                );
                self.ensure(name, step, key, owner, report, || {
                    manager_config_map(instance, &self.config)
                })
                .await?;

                let deployment = manager_deployment(instance, &self.config);
                let key = deployment.key();
                self.ensure(name, step, key, owner, report, move || Ok(deployment))
                    .await
            }
        }
    }

    /// Create the object at `key` if the store does not have it.
    ///
    /// Not found leads to a create; already exists on create counts as
    /// present. Anything else is returned.
    async fn ensure<F>(
        &self,
        workflow: &str,
        step: Step,
        key: ObjectKey,
        owner: &OwnerReference,
        report: &mut ConvergeReport,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<Resource>,
    {
        match self.store.get(&key).await {
            Ok(_) => {
                self.reporter.resource_present(workflow, step, &key, false);
                report.present.push(key);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut resource = build()?;
        if resource.key() != key {
            return Err(Error::Internal(format!(
                "Built {} while ensuring {}",
                resource.key(),
                key
            )));
        }
        set_owner_reference(owner, &mut resource);

        match self.store.create(resource).await {
            Ok(_) => {
                self.reporter.resource_created(workflow, step, &key);
                report.created.push(key);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                self.reporter.resource_present(workflow, step, &key, true);
                report.present.push(key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
