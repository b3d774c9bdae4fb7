//! Shell fragments composed into one script per stage.
//!
//! Each fragment is plain text with `{{ name }}` placeholders. Fragments that
//! depend on optional settings (pull, push, task count) are included or left
//! out at composition time; the text itself has no conditionals.

const PREAMBLE_HEAD: &str = r#"
jobid="{{ jobid }}"
outpath="{{ outpath }}"
registry="{{ registry }}"
"#;

const PREAMBLE_CORES: &str = "cores_per_task={{ cores_per_task }}\n";
const PREAMBLE_NODES: &str = "nodes={{ nodes }}\n";
const PREAMBLE_TASKS: &str = "tasks={{ tasks }}\n";

const PREAMBLE_BANNER: &str = r#"
echo ">> jobid        = $jobid"
echo ">> outpath      = $outpath"
echo ">> registry     = $registry"
echo ">> hostname     = "$(hostname)
"#;

const BANNER_CORES: &str = "echo \">> cores/task   = $cores_per_task\"\n";
const BANNER_NODES: &str = "echo \">> nodes        = $nodes\"\n";
const BANNER_TASKS: &str = "echo \">> tasks        = $tasks\"\n";

const PREAMBLE_WORKDIR: &str = r#"
mkdir -p -v $outpath; cd $outpath
"#;

const INSTALL_TOOL: &str = r#"
# Install oras
cd /tmp
VERSION="{{ tool_version }}"
curl -LO "{{ tool_base_url }}/v${VERSION}/oras_${VERSION}_linux_{{ arch }}.tar.gz"
mkdir -p oras-install/
tar -zxf oras_${VERSION}_*.tar.gz -C oras-install/
mv oras-install/oras /usr/local/bin/ || sudo mv oras-install/oras /usr/local/bin/
rm -rf oras_${VERSION}_*.tar.gz oras-install/
cd -

"#;

const PULL_ARTIFACT: &str = r#"
echo "Looking for $jobid with oras repo list"
if ! oras repo list $registry {{ plain_http_flag }} | grep -q ${jobid}; then
    echo "Artifact $registry/${jobid} is not in the registry"
    exit 1
fi
echo "Pulling oras artifact to $outpath"
oras pull $registry/${jobid}:{{ pull_tag }} {{ plain_http_flag }}
"#;

// Must directly follow the user payload so $? is the payload's status
const PUSH_ARTIFACT: &str = r#"
retval=$?
if [ $retval -eq 0 ];
  then
    echo "Job was successful, pushing result to $registry/${jobid}:{{ push_tag }}"
    cd $outpath
    oras push {{ plain_http_flag }} $registry/${jobid}:{{ push_tag }} .
  else
    echo "Job was not successful"
    exit 1
fi
"#;

/// Which optional numeric knobs the preamble binds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preamble {
    pub cores_per_task: bool,
    pub nodes: bool,
    pub tasks: bool,
}

/// A composable script fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Binds job identity and knobs, prints a banner, enters the workdir
    Preamble(Preamble),
    /// Installs the registry client for the job's arch
    InstallTool,
    /// Checks the artifact is listed, then pulls it
    PullArtifact,
    /// User payload, inserted verbatim
    Payload(String),
    /// Pushes the result if the payload succeeded, else exits nonzero
    PushArtifact,
}

impl Fragment {
    /// Fragment text.
    pub fn text(&self) -> String {
        match self {
            Fragment::Preamble(knobs) => {
                let mut text = PREAMBLE_HEAD.to_string();
                let mut banner = PREAMBLE_BANNER.to_string();
                if knobs.cores_per_task {
                    text.push_str(PREAMBLE_CORES);
                    banner.push_str(BANNER_CORES);
                }
                if knobs.nodes {
                    text.push_str(PREAMBLE_NODES);
                    banner.push_str(BANNER_NODES);
                }
                if knobs.tasks {
                    text.push_str(PREAMBLE_TASKS);
                    banner.push_str(BANNER_TASKS);
                }
                text.push_str(&banner);
                text.push_str(PREAMBLE_WORKDIR);
                text
            }
            Fragment::InstallTool => INSTALL_TOOL.to_string(),
            Fragment::PullArtifact => PULL_ARTIFACT.to_string(),
            Fragment::Payload(script) => {
                if script.ends_with('\n') {
                    script.clone()
                } else {
                    format!("{}\n", script)
                }
            }
            Fragment::PushArtifact => PUSH_ARTIFACT.to_string(),
        }
    }

    /// Placeholders this fragment declares. The payload declares none; any
    /// placeholders a user writes are resolved against the same parameters.
    pub fn declared_placeholders(&self) -> Vec<&'static str> {
        match self {
            Fragment::Preamble(knobs) => {
                let mut names = vec!["jobid", "outpath", "registry"];
                if knobs.cores_per_task {
                    names.push("cores_per_task");
                }
                if knobs.nodes {
                    names.push("nodes");
                }
                if knobs.tasks {
                    names.push("tasks");
                }
                names
            }
            Fragment::InstallTool => vec!["tool_version", "tool_base_url", "arch"],
            Fragment::PullArtifact => vec!["plain_http_flag", "pull_tag"],
            Fragment::Payload(_) => vec![],
            Fragment::PushArtifact => vec!["push_tag", "plain_http_flag"],
        }
    }
}

/// Concatenate fragments in order.
pub fn compose(fragments: &[Fragment]) -> String {
    fragments.iter().map(Fragment::text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Template;
    use std::collections::BTreeSet;

    fn all_fragments() -> Vec<Fragment> {
        vec![
            Fragment::Preamble(Preamble {
                cores_per_task: true,
                nodes: true,
                tasks: true,
            }),
            Fragment::InstallTool,
            Fragment::PullArtifact,
            Fragment::Payload("echo hi".into()),
            Fragment::PushArtifact,
        ]
    }

    #[test]
    fn test_declared_placeholders_match_text() {
        for fragment in all_fragments() {
            let template = Template::text(fragment.text());
            template.check().unwrap();
            let declared: BTreeSet<String> = fragment
                .declared_placeholders()
                .into_iter()
                .map(String::from)
                .collect();
            assert_eq!(template.placeholders(), declared, "{:?}", fragment);
        }
    }

    #[test]
    fn test_preamble_omits_unset_knobs() {
        let text = Fragment::Preamble(Preamble::default()).text();
        assert!(text.contains("jobid=\"{{ jobid }}\""));
        assert!(!text.contains("tasks="));
        assert!(!text.contains("cores_per_task="));
        assert!(text.trim_end().ends_with("mkdir -p -v $outpath; cd $outpath"));
    }

    #[test]
    fn test_compose_keeps_order() {
        let script = compose(&all_fragments());
        let preamble = script.find("jobid=").unwrap();
        let install = script.find("# Install oras").unwrap();
        let pull = script.find("oras pull").unwrap();
        let payload = script.find("echo hi\n").unwrap();
        let push = script.find("retval=$?").unwrap();
        assert!(preamble < install && install < pull && pull < payload && payload < push);
    }

    #[test]
    fn test_payload_is_newline_terminated() {
        assert_eq!(Fragment::Payload("a".into()).text(), "a\n");
        assert_eq!(Fragment::Payload("a\n".into()).text(), "a\n");
    }
}
