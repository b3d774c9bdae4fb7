//! Workflow document parser.

use std::path::Path;

use super::types::WorkflowInstance;
use crate::error::{Error, Result};

/// Parse a workflow instance from a YAML (or JSON) string.
pub fn parse_workflow(yaml: &str) -> Result<WorkflowInstance> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }

    let instance: WorkflowInstance = serde_yaml::from_str(yaml).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid YAML: {}", msg))
        }
    })?;
    Ok(instance)
}

/// Parse a workflow instance from a file path.
pub fn parse_workflow_file(path: &Path) -> Result<WorkflowInstance> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WhenClause;

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
apiVersion: stagewright.dev/v1alpha1
kind: Workflow
metadata:
  name: wf1
  namespace: ns1
  uid: 7b0c7c1e-0000-4000-8000-000000000001
spec:
  registry:
    plainHttp: false
    TLSVerify: true
  manager:
    image: ghcr.io/example/manager:latest
    interactive: true
  cluster:
    maxSize: 3
  workflow:
    completed: 4
    prefix: structure_
    events:
      - metric: count.job_b.failed
        when: ">= 2"
        action: finish-workflow
      - metric: mean.job_a.duration
        when: 10
        action: grow
        maxSize: 6
  jobs:
    - name: job_a
      image: ghcr.io/example/a:latest
      arch: arm64
      config:
        nodes: 2
        coresPerTask: 6
        gpulabel: amd.com/gpu
        walltime: "600"
      registry:
        push: job_a
      properties:
        save-path: /tmp/logs
      script: echo a
    - name: job_b
      image: ghcr.io/example/b:latest
      registry:
        pull: job_a
        plainHttp: false
"#;

        let instance = parse_workflow(yaml).unwrap();
        assert_eq!(instance.metadata.name, "wf1");
        assert_eq!(instance.metadata.namespace, "ns1");
        assert!(instance.metadata.uid.is_some());

        let spec = &instance.spec;
        assert!(!spec.registry.plain_http());
        assert!(spec.registry.tls_verify);
        assert!(spec.manager.interactive);
        assert_eq!(spec.cluster.max_size, 3);
        assert_eq!(spec.workflow.completed_threshold, 4);
        assert_eq!(spec.workflow.job_name_prefix, "structure_");
        assert_eq!(spec.workflow.events.len(), 2);
        assert_eq!(
            spec.workflow.events[0].when,
            Some(WhenClause::Expression(">= 2".into()))
        );
        assert_eq!(spec.workflow.events[1].when, Some(WhenClause::Value(10.0)));
        assert_eq!(spec.workflow.events[1].max_size, Some(6));

        assert_eq!(spec.stage_names(), vec!["job_a", "job_b"]);
        let a = &spec.jobs[0];
        assert_eq!(a.config.nodes, 2);
        assert_eq!(a.config.cores_per_task, 6);
        assert_eq!(a.config.gpu_label, "amd.com/gpu");
        assert_eq!(a.config.walltime.as_deref(), Some("600"));
        assert_eq!(a.properties["save-path"], "/tmp/logs");
        assert!(!spec.jobs[1].registry.plain_http());
    }

    #[test]
    fn test_namespace_defaults() {
        let instance = parse_workflow("metadata:\n  name: wf1\n").unwrap();
        assert_eq!(instance.metadata.namespace, "default");
        assert_eq!(instance.kind, "Workflow");
        assert!(instance.spec.jobs.is_empty());
    }

    #[test]
    fn test_parse_alias_field_names() {
        let yaml = r#"
metadata:
  name: wf1
spec:
  workflow:
    completedThreshold: 2
    jobNamePrefix: job_
"#;
        let instance = parse_workflow(yaml).unwrap();
        assert_eq!(instance.spec.workflow.completed_threshold, 2);
        assert_eq!(instance.spec.workflow.job_name_prefix, "job_");
    }

    #[test]
    fn test_parse_empty_workflow() {
        let result = parse_workflow("   ");
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("empty workflow"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_workflow("metadata: [broken");
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("invalid yaml"));
    }

    #[test]
    fn test_parse_missing_metadata() {
        let result = parse_workflow("spec:\n  jobs: []\n");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing required field: metadata"));
    }
}
