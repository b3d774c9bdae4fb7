//! Manager hand-off payload.
//!
//! The manager process reads one configuration object with:
//! - the entrypoint script
//! - `workflow.yaml`: completion policy and cluster sizing
//! - `job_<i>.yaml`: one document per stage, in stage order

mod entrypoint;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::jobs::JobAssembler;
use crate::workflow::{CompletionPolicy, WorkflowInstance};

pub use entrypoint::render_entrypoint;

/// Key of the workflow policy document.
pub const WORKFLOW_FILE: &str = "workflow.yaml";

/// Key of the document for stage `index`.
pub fn job_file(index: usize) -> String {
    format!("job_{}.yaml", index)
}

#[derive(Debug, Serialize)]
struct ClusterSizing {
    max_size: u32,
    max_nodes: u32,
    cores_per_node: u32,
}

#[derive(Debug, Serialize)]
struct WorkflowFile<'a> {
    name: &'a str,
    namespace: &'a str,
    workflow: &'a CompletionPolicy,
    cluster: ClusterSizing,
    jobs: Vec<String>,
}

/// Render `workflow.yaml`.
pub fn render_workflow_file(instance: &WorkflowInstance) -> Result<String> {
    let spec = &instance.spec;
    let file = WorkflowFile {
        name: instance.name(),
        namespace: instance.namespace(),
        workflow: &spec.workflow,
        cluster: ClusterSizing {
            max_size: spec.cluster.max_size,
            max_nodes: spec.manager.max_nodes,
            cores_per_node: spec.manager.cores_per_node,
        },
        jobs: (0..spec.jobs.len()).map(job_file).collect(),
    };
    Ok(serde_yaml::to_string(&file)?)
}

/// Build the full configuration object data.
///
/// All-or-nothing: a failure assembling any stage fails the whole payload.
pub fn manager_config_data(
    instance: &WorkflowInstance,
    config: &Config,
) -> Result<BTreeMap<String, String>> {
    let assembler = JobAssembler::new(instance, config);

    let mut data = BTreeMap::new();
    for (index, job) in instance.spec.jobs.iter().enumerate() {
        let assembled = assembler.assemble(job)?;
        data.insert(job_file(index), assembled.document);
    }
    data.insert(WORKFLOW_FILE.to_string(), render_workflow_file(instance)?);
    data.insert(
        config.manager.entrypoint.clone(),
        render_entrypoint(instance, config)?,
    );

    info!(
        workflow = %instance.name(),
        namespace = %instance.namespace(),
        entries = data.len(),
        "Prepared manager configuration"
    );
    Ok(data)
}
