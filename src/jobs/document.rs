//! The `job_<i>.yaml` document the manager reads for each stage.
//!
//! Scalars are bound through `yaml_*` placeholders holding JSON-quoted
//! values, which are valid YAML flow scalars. Multi-line values (script and
//! app config) are re-indented and appended as literal segments under an
//! explicit `|2` indentation indicator, so their content is never scanned
//! for placeholders. The chomping indicator is chosen so the parsed value
//! has exactly the original trailing newlines.

use crate::error::{Error, Result};
use crate::templates::{reindent, ParamSet, Template, EMBED_INDENT};

use super::assembler::ResolvedJob;

const DOCUMENT_HEAD: &str = r#"name: {{ yaml_name }}
image: {{ yaml_image }}
workdir: {{ yaml_workdir }}
interactive: {{ yaml_interactive }}
config:
  nnodes: {{ yaml_nodes }}
  cores_per_task: {{ yaml_cores_per_task }}
"#;

const CONFIG_TASKS: &str = "  tasks: {{ yaml_tasks }}\n";

const CONFIG_TAIL: &str = r#"  ngpus: {{ yaml_gpus }}
  gpulabel: {{ yaml_gpu_label }}
  pull_policy: {{ yaml_pull_policy }}
  retry_failure: {{ yaml_retry_failure }}
"#;

const CONFIG_WALLTIME: &str = "  walltime: {{ yaml_walltime }}\n";
const CONFIG_COMMAND: &str = "  command: {{ yaml_command }}\n";

const REGISTRY_HEAD: &str = r#"registry:
  host: {{ yaml_registry_host }}
  plain_http: {{ yaml_plain_http }}
"#;

const REGISTRY_PUSH: &str = "  push: {{ yaml_push }}\n";
const REGISTRY_PULL: &str = "  pull: {{ yaml_pull }}\n";

const PROPERTIES: &str = "properties: {{ yaml_properties }}\n";

fn quoted<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Block scalar with an explicit indentation indicator. Keep chomping (`+`)
/// preserves every trailing newline; strip (`-`) covers a body with none.
fn block(key: &str, body: &str) -> String {
    let mut body = reindent(body, EMBED_INDENT);
    let chomping = if body.ends_with('\n') {
        '+'
    } else {
        body.push('\n');
        '-'
    };
    format!("{}: |2{}\n{}", key, chomping, body)
}

fn document_template(job: &ResolvedJob, script: &str) -> Template {
    let step = &job.step;
    let mut text = String::from(DOCUMENT_HEAD);
    if step.config.tasks.is_some() {
        text.push_str(CONFIG_TASKS);
    }
    text.push_str(CONFIG_TAIL);
    if step.config.walltime.is_some() {
        text.push_str(CONFIG_WALLTIME);
    }
    if step.config.command.is_some() {
        text.push_str(CONFIG_COMMAND);
    }
    text.push_str(REGISTRY_HEAD);
    if !job.registry.push.is_empty() {
        text.push_str(REGISTRY_PUSH);
    }
    if !job.registry.pull.is_empty() {
        text.push_str(REGISTRY_PULL);
    }
    text.push_str(PROPERTIES);

    let mut template = Template::text(text);
    if !step.app_config.is_empty() {
        template.push_literal(block("app-config", &step.app_config));
    }
    if !script.is_empty() {
        template.push_literal(block("script", script));
    }
    template
}

fn document_params(job: &ResolvedJob) -> Result<ParamSet> {
    let step = &job.step;
    let config = &step.config;
    let mut params = ParamSet::new();
    params.insert("yaml_name", quoted(&step.name)?)?;
    params.insert("yaml_image", quoted(&step.image)?)?;
    params.insert("yaml_workdir", quoted(&step.workdir)?)?;
    params.insert("yaml_interactive", step.interactive.to_string())?;
    params.insert("yaml_nodes", config.nodes.to_string())?;
    params.insert("yaml_cores_per_task", config.cores_per_task.to_string())?;
    if let Some(tasks) = config.tasks {
        params.insert("yaml_tasks", tasks.to_string())?;
    }
    params.insert("yaml_gpus", config.gpus.to_string())?;
    params.insert("yaml_gpu_label", quoted(&config.gpu_label)?)?;
    params.insert("yaml_pull_policy", quoted(&config.pull_policy)?)?;
    params.insert("yaml_retry_failure", config.retry_failure.to_string())?;
    if let Some(walltime) = &config.walltime {
        params.insert("yaml_walltime", quoted(walltime)?)?;
    }
    if let Some(command) = &config.command {
        params.insert("yaml_command", quoted(command)?)?;
    }
    params.insert("yaml_registry_host", quoted(&job.registry.host)?)?;
    params.insert("yaml_plain_http", job.registry.plain_http.to_string())?;
    if !job.registry.push.is_empty() {
        params.insert("yaml_push", quoted(&job.registry.push)?)?;
    }
    if !job.registry.pull.is_empty() {
        params.insert("yaml_pull", quoted(&job.registry.pull)?)?;
    }
    params.insert("yaml_properties", quoted(&step.properties)?)?;
    Ok(params)
}

/// Render the manager document for a resolved job and its rendered script.
pub fn render_document(job: &ResolvedJob, script: &str) -> Result<String> {
    let document = document_template(job, script).render(&document_params(job)?)?;

    // The document is consumed by another program; refuse to hand off
    // anything that does not parse.
    serde_yaml::from_str::<serde_yaml::Value>(&document).map_err(|e| {
        Error::Template(format!(
            "Job document for '{}' is not valid YAML: {}",
            job.step.name, e
        ))
    })?;
    Ok(document)
}
