//! Manager entrypoint script.

use crate::config::Config;
use crate::error::Result;
use crate::templates::{ParamSet, Template};
use crate::workflow::WorkflowInstance;

use super::WORKFLOW_FILE;

const ENTRYPOINT: &str = r#"#!/bin/bash

cd "{{ mount_path }}"

echo ">> workflow     = {{ workflow_name }}"
echo ">> namespace    = {{ namespace }}"
echo ">> registry     = {{ registry }}"
echo ">> stages       = {{ stages }}"
ls

{{ manager_command }} start --config-dir "{{ mount_path }}" --registry "{{ registry }}" {{ plain_http_flag }} {{ workflow_file }}
"#;

const KEEP_ALIVE: &str = "\nsleep infinity\n";

/// Render the manager's bootstrap script.
pub fn render_entrypoint(instance: &WorkflowInstance, config: &Config) -> Result<String> {
    let mut text = String::from(ENTRYPOINT);
    if instance.spec.manager.interactive {
        text.push_str(KEEP_ALIVE);
    }

    let mut params = ParamSet::new();
    params.insert_shell("mount_path", config.manager.mount_path.as_str())?;
    params.insert_shell("workflow_name", instance.name())?;
    params.insert_shell("namespace", instance.namespace())?;
    params.insert_shell("registry", instance.registry_address())?;
    params.insert_shell_words("stages", &instance.spec.stage_names())?;
    params.insert("manager_command", config.manager.command.as_str())?;
    params.insert("workflow_file", WORKFLOW_FILE)?;
    params.insert(
        "plain_http_flag",
        if instance.spec.registry.plain_http() {
            "--plain-http"
        } else {
            ""
        },
    )?;

    Template::text(text).render(&params)
}
