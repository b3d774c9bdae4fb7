//! Workflow validation and defaulting.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use super::naming::{DEFAULT_REGISTRY_NAME, DEFAULT_REGISTRY_PORT};
use super::types::{WhenClause, WorkflowEvent, WorkflowInstance};
use crate::config::{default_pull_policy, Config};
use crate::error::{Error, Result};
use crate::templates::is_shell_word;

/// Actions the manager knows how to take in response to an event.
pub const WORKFLOW_ACTIONS: &[&str] = &["grow", "shrink", "finish-workflow"];

/// Architectures the registry client is published for.
pub const SUPPORTED_ARCHES: &[&str] = &["amd64", "arm64"];

fn when_regex() -> &'static Regex {
    static WHEN_REGEX: OnceLock<Regex> = OnceLock::new();
    WHEN_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(<=|>=|==|<|>|=)\s*(-?\d+(\.\d+)?)\s*$").expect("valid regex")
    })
}

fn oci_tag_regex() -> &'static Regex {
    static OCI_TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    OCI_TAG_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").expect("valid regex"))
}

/// Lowercase alphanumerics and '-', not starting or ending with '-'.
fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Stage names also appear in event metrics (`count.<stage>.failed`), so
/// '_' is allowed and '.' is not.
fn is_stage_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn check_shell_safe(what: &str, value: &str) -> Result<()> {
    if is_shell_word(value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} '{}' contains shell-unsafe characters",
            what, value
        )))
    }
}

fn check_tag(job: &str, field: &str, tag: &str) -> Result<()> {
    if tag.is_empty() || oci_tag_regex().is_match(tag) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Job '{}' has invalid registry.{} tag '{}'",
            job, field, tag
        )))
    }
}

/// Validate a workflow instance and return a defaulted copy.
///
/// Checks for:
/// - A DNS-safe instance name
/// - `cluster.maxSize >= 1` and `workflow.completed >= 1`
/// - Named, imaged, uniquely named jobs with a supported arch
/// - Registry tags, hosts, and workdirs that are safe to place in a script
/// - Event actions and `when` syntax
///
/// Nothing is returned on failure, so callers never act on a half-defaulted spec.
pub fn validate_workflow(instance: &WorkflowInstance, config: &Config) -> Result<WorkflowInstance> {
    let mut instance = instance.clone();
    apply_defaults(&mut instance, config);

    let name = &instance.metadata.name;
    if name.is_empty() {
        return Err(Error::Validation("Workflow name is required".into()));
    }
    if !is_dns_label(name) {
        return Err(Error::Validation(format!(
            "Workflow name '{}' must be lowercase alphanumeric characters or '-'",
            name
        )));
    }
    let namespace = &instance.metadata.namespace;
    if !namespace.is_empty() && !is_dns_label(namespace) {
        return Err(Error::Validation(format!(
            "Namespace '{}' must be lowercase alphanumeric characters or '-'",
            namespace
        )));
    }

    let spec = &instance.spec;
    check_shell_safe("Registry host", &spec.registry.host)?;
    if instance.has_in_cluster_registry() && !is_dns_label(&spec.registry.name) {
        return Err(Error::Validation(format!(
            "Registry name '{}' must be lowercase alphanumeric characters or '-'",
            spec.registry.name
        )));
    }
    check_shell_safe("Job name prefix", &spec.workflow.job_name_prefix)?;

    if spec.cluster.max_size < 1 {
        return Err(Error::Validation("cluster.maxSize must be >= 1".into()));
    }
    if spec.workflow.completed_threshold < 1 {
        return Err(Error::Validation("workflow.completed must be >= 1".into()));
    }

    let mut names = HashSet::new();
    for (index, job) in spec.jobs.iter().enumerate() {
        if job.name.is_empty() {
            return Err(Error::Validation(format!("Job {} has no name", index)));
        }
        if !is_stage_name(&job.name) {
            return Err(Error::Validation(format!(
                "Job name '{}' must be lowercase alphanumeric characters, '-' or '_'",
                job.name
            )));
        }
        if !names.insert(job.name.as_str()) {
            return Err(Error::Validation(format!("Duplicate job name: {}", job.name)));
        }
        if job.image.is_empty() {
            return Err(Error::Validation(format!(
                "Job '{}' requires an image",
                job.name
            )));
        }
        if !job.arch.is_empty() && !SUPPORTED_ARCHES.contains(&job.arch.as_str()) {
            return Err(Error::Validation(format!(
                "Job '{}' has unsupported arch '{}' (expected one of {})",
                job.name,
                job.arch,
                SUPPORTED_ARCHES.join(", ")
            )));
        }
        check_shell_safe(&format!("Job '{}' workdir", job.name), &job.workdir)?;
        check_shell_safe(
            &format!("Job '{}' registry host", job.name),
            &job.registry.host,
        )?;
        check_tag(&job.name, "push", &job.registry.push)?;
        check_tag(&job.name, "pull", &job.registry.pull)?;
    }

    for event in &spec.workflow.events {
        validate_event(event)?;
    }

    debug!(
        workflow = %instance.metadata.name,
        registry = %instance.registry_address(),
        jobs = spec.jobs.len(),
        "Workflow validated"
    );
    Ok(instance)
}

fn apply_defaults(instance: &mut WorkflowInstance, config: &Config) {
    let in_cluster = instance.has_in_cluster_registry();
    let spec = &mut instance.spec;

    if spec.manager.image.is_empty() {
        spec.manager.image = config.images.manager.clone();
    }
    if spec.manager.subdomain.is_empty() {
        spec.manager.subdomain = "r".to_string();
    }
    if spec.manager.replicas == 0 {
        spec.manager.replicas = 1;
    }
    if spec.manager.cores_per_node == 0 {
        spec.manager.cores_per_node = 4;
    }
    if spec.manager.pull_policy.is_empty() {
        spec.manager.pull_policy = default_pull_policy();
    }

    if spec.registry.image.is_empty() {
        spec.registry.image = config.images.registry.clone();
    }
    if spec.registry.pull_policy.is_empty() {
        spec.registry.pull_policy = default_pull_policy();
    }

    // An external registry keeps exactly what the user gave
    if in_cluster {
        if spec.registry.port == 0 {
            spec.registry.port = DEFAULT_REGISTRY_PORT;
        }
        if spec.registry.name.is_empty() {
            spec.registry.name = DEFAULT_REGISTRY_NAME.to_string();
        }
        if spec.registry.replicas == 0 {
            spec.registry.replicas = 1;
        }
    }
}

fn validate_event(event: &WorkflowEvent) -> Result<()> {
    if event.metric.is_empty() {
        return Err(Error::Validation("Event is missing a metric".into()));
    }
    if !WORKFLOW_ACTIONS.contains(&event.action.as_str()) {
        return Err(Error::Validation(format!(
            "Event for '{}' has invalid action '{}'",
            event.metric, event.action
        )));
    }
    match &event.when {
        None => Ok(()),
        Some(WhenClause::Value(v)) if *v >= 0.0 => Ok(()),
        Some(WhenClause::Value(v)) => Err(Error::Validation(format!(
            "Event for '{}' has negative when value {}",
            event.metric, v
        ))),
        Some(WhenClause::Expression(expr)) if when_regex().is_match(expr) => Ok(()),
        Some(WhenClause::Expression(expr)) => Err(Error::Validation(format!(
            "Event for '{}' has invalid when '{}'",
            event.metric, expr
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflow;

    fn base(extra: &str) -> String {
        format!(
            r#"
metadata:
  name: wf1
  namespace: ns1
spec:
  cluster:
    maxSize: 2
  workflow:
    completed: 1
{}"#,
            extra
        )
    }

    fn validate(yaml: &str) -> Result<WorkflowInstance> {
        validate_workflow(&parse_workflow(yaml).unwrap(), &Config::default())
    }

    #[test]
    fn test_validate_applies_defaults() {
        let instance = validate(&base("")).unwrap();
        let spec = &instance.spec;
        assert_eq!(spec.registry.port, 5000);
        assert_eq!(spec.registry.name, "registry");
        assert_eq!(spec.registry.replicas, 1);
        assert_eq!(spec.registry.image, "ghcr.io/oras-project/registry:latest");
        assert_eq!(spec.manager.subdomain, "r");
        assert_eq!(spec.manager.replicas, 1);
        assert_eq!(spec.manager.cores_per_node, 4);
        assert_eq!(spec.manager.pull_policy, "IfNotPresent");
        assert!(spec.manager.image.ends_with(":manager"));
    }

    #[test]
    fn test_external_registry_is_not_defaulted() {
        let yaml = base("  registry:\n    host: ext.example.com\n");
        let instance = validate(&yaml).unwrap();
        assert_eq!(instance.spec.registry.port, 0);
        assert_eq!(instance.spec.registry.replicas, 0);
        assert_eq!(instance.registry_address(), "ext.example.com");
    }

    #[test]
    fn test_validate_does_not_mutate_input() {
        let parsed = parse_workflow(&base("")).unwrap();
        let validated = validate_workflow(&parsed, &Config::default()).unwrap();
        assert_eq!(parsed.spec.registry.port, 0);
        assert_ne!(parsed, validated);
    }

    #[test]
    fn test_validate_min_sizes() {
        let yaml = r#"
metadata:
  name: wf1
spec:
  workflow:
    completed: 1
"#;
        let err = validate(yaml).unwrap_err();
        assert!(err.to_string().contains("maxSize"));

        let yaml = r#"
metadata:
  name: wf1
spec:
  cluster:
    maxSize: 1
"#;
        let err = validate(yaml).unwrap_err();
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_validate_invalid_name() {
        let yaml = base("").replace("name: wf1", "name: My_Workflow");
        assert!(validate(&yaml).is_err());
    }

    #[test]
    fn test_validate_jobs() {
        let missing_image = base("  jobs:\n    - name: a\n");
        assert!(validate(&missing_image)
            .unwrap_err()
            .to_string()
            .contains("requires an image"));

        let duplicate = base(
            "  jobs:\n    - name: a\n      image: x\n    - name: a\n      image: y\n",
        );
        assert!(validate(&duplicate)
            .unwrap_err()
            .to_string()
            .contains("Duplicate job name"));

        let bad_arch = base("  jobs:\n    - name: a\n      image: x\n      arch: s390x\n");
        assert!(validate(&bad_arch).is_err());
    }

    #[test]
    fn test_validate_events() {
        let good = base(
            r#"    events:
      - metric: count.a.failed
        when: ">= 3"
        action: finish-workflow
      - metric: count.a.succeeded
        when: 2
        action: grow
      - metric: count.a.failed
        action: shrink
"#,
        );
        assert!(validate(&good).is_ok());

        let bad_action = base(
            "    events:\n      - metric: count.a.failed\n        action: explode\n",
        );
        assert!(validate(&bad_action)
            .unwrap_err()
            .to_string()
            .contains("invalid action"));

        let bad_when = base(
            "    events:\n      - metric: count.a.failed\n        when: sometimes\n        action: grow\n",
        );
        assert!(validate(&bad_when)
            .unwrap_err()
            .to_string()
            .contains("invalid when"));
    }

    #[test]
    fn test_validate_job_names_and_tags() {
        let job = |extra: &str| base(&format!("  jobs:\n    - name: a\n      image: x\n{}", extra));

        assert!(validate(&base("  jobs:\n    - name: job_a\n      image: x\n")).is_ok());
        for name in ["a}$(id)", "A", "a.b", "_a", "a b"] {
            let yaml = base(&format!("  jobs:\n    - name: \"{}\"\n      image: x\n", name));
            assert!(
                validate(&yaml).unwrap_err().to_string().contains("Job name"),
                "{} should be rejected",
                name
            );
        }

        assert!(validate(&job("      registry:\n        push: v1.0_rc-2\n")).is_ok());
        let err = validate(&job("      registry:\n        push: \"a; rm -rf $HOME\"\n")).unwrap_err();
        assert!(err.to_string().contains("registry.push"));
        let err = validate(&job("      registry:\n        pull: \".hidden\"\n")).unwrap_err();
        assert!(err.to_string().contains("registry.pull"));
        let long = "t".repeat(129);
        assert!(validate(&job(&format!("      registry:\n        push: {}\n", long))).is_err());
    }

    #[test]
    fn test_validate_shell_unsafe_values() {
        let workdir = base("  jobs:\n    - name: a\n      image: x\n      workdir: \"/tmp/$(touch /tmp/x)\"\n");
        assert!(validate(&workdir)
            .unwrap_err()
            .to_string()
            .contains("workdir"));

        let job_host = base("  jobs:\n    - name: a\n      image: x\n      registry:\n        host: \"reg;id\"\n");
        assert!(validate(&job_host)
            .unwrap_err()
            .to_string()
            .contains("registry host"));

        let spec_host = base("  registry:\n    host: \"reg.example.com $(id)\"\n");
        assert!(validate(&spec_host)
            .unwrap_err()
            .to_string()
            .contains("Registry host"));

        let prefix = base("    prefix: \"job$\"\n");
        assert!(validate(&prefix)
            .unwrap_err()
            .to_string()
            .contains("prefix"));

        let namespace = base("").replace("namespace: ns1", "namespace: \"ns;1\"");
        assert!(validate(&namespace).is_err());

        let registry_name = base("  registry:\n    name: Reg_1\n");
        assert!(validate(&registry_name)
            .unwrap_err()
            .to_string()
            .contains("Registry name"));
    }
}
