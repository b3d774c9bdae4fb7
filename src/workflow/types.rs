//! Workflow spec type definitions.
//!
//! The desired state arrives as a namespaced resource document. Field names
//! are camelCase on the wire; a handful of fields accept the older names the
//! resource schema used (`completed`, `prefix`, `gpulabel`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A workflow instance: identity plus desired spec.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: stagewright.dev/v1alpha1
/// kind: Workflow
/// metadata:
///   name: wf1
///   namespace: ns1
/// spec:
///   cluster:
///     maxSize: 2
///   workflow:
///     completed: 4
///   jobs:
///     - name: job_a
///       image: ghcr.io/example/job-a:latest
///       registry:
///         push: job_a
///       script: ./run-a.sh
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: InstanceMeta,

    #[serde(default)]
    pub spec: WorkflowSpec,
}

fn default_api_version() -> String {
    "stagewright.dev/v1alpha1".to_string()
}

fn default_kind() -> String {
    "Workflow".to_string()
}

/// Identity of a workflow instance. Every derived resource name is a pure
/// function of these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMeta {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Assigned by the declarative-state API; carried into owner references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Root of the desired state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Artifact registry used to pass results between stages
    #[serde(default)]
    pub registry: RegistryPolicy,

    /// Coordination process that runs the workflow
    #[serde(default)]
    pub manager: ManagerPolicy,

    #[serde(default)]
    pub cluster: ClusterPolicy,

    /// What constitutes completion, and event policy
    #[serde(default)]
    pub workflow: CompletionPolicy,

    /// Ordered stages. Order defines the stage sequence.
    #[serde(default)]
    pub jobs: Vec<JobStep>,
}

/// Registry configuration. An empty host means the registry is provisioned
/// in-cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPolicy {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub port: u16,

    /// Defaults to true unless explicitly disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_http: Option<bool>,

    #[serde(default, alias = "TLSVerify")]
    pub tls_verify: bool,

    #[serde(default)]
    pub replicas: u32,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub pull_policy: String,

    /// Instance type to pin registry replicas to
    #[serde(default)]
    pub node_selector: String,
}

impl RegistryPolicy {
    /// Effective plain-HTTP flag.
    pub fn plain_http(&self) -> bool {
        self.plain_http.unwrap_or(true)
    }
}

/// Workflow manager deployment settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerPolicy {
    #[serde(default)]
    pub replicas: u32,

    #[serde(default)]
    pub subdomain: String,

    /// Maximum nodes the jobs of the workflow may add up to
    #[serde(default)]
    pub max_nodes: u32,

    #[serde(default)]
    pub cores_per_node: u32,

    /// Keep the manager container alive after the manager exits
    #[serde(default)]
    pub interactive: bool,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub pull_policy: String,

    #[serde(default)]
    pub node_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicy {
    /// Upper bound for job submission (and scaling)
    #[serde(default)]
    pub max_size: u32,

    /// Reserved, unused
    #[serde(default)]
    pub autoscale: bool,
}

/// Completion and event policy. Interpreted by the external manager; carried
/// through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPolicy {
    /// Number of workflow sequences required for completion
    #[serde(default, rename = "completed", alias = "completedThreshold")]
    pub completed_threshold: u32,

    #[serde(
        default,
        rename = "prefix",
        alias = "jobNamePrefix",
        skip_serializing_if = "String::is_empty"
    )]
    pub job_name_prefix: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<WorkflowEvent>,
}

/// Metric-triggered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Dotted lookup key, e.g. `count.job_a.failed`
    pub metric: String,

    /// Predicate; absent means "nonzero or nonempty"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,

    /// Action name, e.g. `finish-workflow`
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_completions: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
}

/// An event predicate: a bare number (equality) or `<op> <number>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhenClause {
    Value(f64),
    Expression(String),
}

/// One ordered workflow stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStep {
    pub name: String,

    #[serde(default)]
    pub config: JobConfig,

    #[serde(default)]
    pub registry: RegistryOverride,

    /// amd64 or arm64
    #[serde(default)]
    pub arch: String,

    /// Opaque payload handed to the job
    #[serde(default)]
    pub app_config: String,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub interactive: bool,

    /// Working directory, also the output path
    #[serde(default)]
    pub workdir: String,

    /// User payload, raw shell
    #[serde(default)]
    pub script: String,
}

impl JobStep {
    /// A job has a custom registry if any of host, pull, or push is set.
    pub fn has_registry(&self) -> bool {
        !(self.registry.host.is_empty()
            && self.registry.pull.is_empty()
            && self.registry.push.is_empty())
    }
}

/// Per-job resources and runtime knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    #[serde(default)]
    pub nodes: u32,

    #[serde(default)]
    pub cores_per_task: u32,

    /// Explicit task count; when absent the job runtime decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<u32>,

    #[serde(default)]
    pub gpus: u32,

    /// Re-running on bad input is not assumed safe
    #[serde(default)]
    pub retry_failure: bool,

    /// No walltime means no limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walltime: Option<String>,

    #[serde(default)]
    pub pull_policy: String,

    #[serde(default, rename = "gpulabel", alias = "gpuLabel")]
    pub gpu_label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Per-job registry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryOverride {
    /// Tag to push the result to
    #[serde(default)]
    pub push: String,

    /// Tag to pull input from
    #[serde(default)]
    pub pull: String,

    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_http: Option<bool>,
}

impl RegistryOverride {
    /// Effective plain-HTTP flag, true unless disabled.
    pub fn plain_http(&self) -> bool {
        self.plain_http.unwrap_or(true)
    }
}

impl WorkflowSpec {
    /// Get a job step by name.
    pub fn get_job(&self, name: &str) -> Option<&JobStep> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Job names in stage order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }
}
