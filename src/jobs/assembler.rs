//! Per-stage script assembly.

use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::templates::{compose, Fragment, ParamSet, Preamble, Template};
use crate::workflow::{JobStep, WorkflowInstance};

use super::document::render_document;

/// Registry settings a job actually uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegistry {
    pub host: String,
    pub plain_http: bool,
    pub pull: String,
    pub push: String,
}

/// A job step with every default applied and its registry resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJob {
    pub step: JobStep,
    pub registry: ResolvedRegistry,
    /// Job identifier used when the runtime does not export `JOBID`. Shared
    /// by every stage of the workflow; stages differ by registry tag.
    pub jobid: String,
}

/// Environment variable the job runtime uses for the job identifier.
pub const JOBID_VAR: &str = "JOBID";

/// Output of assembling one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledJob {
    pub name: String,
    /// Rendered stage script; empty when the step has no user script
    pub script: String,
    /// The `job_<i>.yaml` document handed to the manager
    pub document: String,
}

/// Merges a workflow's per-step settings with the fragment library.
pub struct JobAssembler<'a> {
    instance: &'a WorkflowInstance,
    config: &'a Config,
}

impl<'a> JobAssembler<'a> {
    pub fn new(instance: &'a WorkflowInstance, config: &'a Config) -> Self {
        Self { instance, config }
    }

    /// Apply job family defaults and resolve the effective registry.
    ///
    /// Total: never fails on missing optional fields.
    pub fn resolve(&self, job: &JobStep) -> ResolvedJob {
        let defaults = &self.config.jobs;
        let mut step = job.clone();

        if step.config.nodes == 0 {
            step.config.nodes = defaults.nodes;
        }
        if step.config.cores_per_task == 0 {
            step.config.cores_per_task = defaults.cores_per_task;
        }
        if step.arch.is_empty() {
            step.arch = defaults.arch.clone();
        }
        if step.workdir.is_empty() {
            step.workdir = defaults.workdir.clone();
        }
        if step.config.gpu_label.is_empty() {
            step.config.gpu_label = defaults.gpu_label.clone();
        }
        if step.config.pull_policy.is_empty() {
            step.config.pull_policy = defaults.pull_policy.clone();
        }

        let registry = if job.has_registry() {
            ResolvedRegistry {
                host: if job.registry.host.is_empty() {
                    self.instance.registry_address()
                } else {
                    job.registry.host.clone()
                },
                plain_http: job.registry.plain_http(),
                pull: job.registry.pull.clone(),
                push: job.registry.push.clone(),
            }
        } else {
            ResolvedRegistry {
                host: self.instance.registry_address(),
                plain_http: self.instance.spec.registry.plain_http(),
                pull: String::new(),
                push: String::new(),
            }
        };

        let jobid = format!(
            "{}{}",
            self.instance.spec.workflow.job_name_prefix,
            self.instance.name()
        );

        ResolvedJob {
            step,
            registry,
            jobid,
        }
    }

    /// Phase one: the ordered fragment list for a resolved job. Empty when
    /// there is no user script.
    pub fn fragments(&self, job: &ResolvedJob) -> Vec<Fragment> {
        if job.step.script.is_empty() {
            return Vec::new();
        }

        let mut fragments = vec![
            Fragment::Preamble(Preamble {
                cores_per_task: true,
                nodes: true,
                tasks: job.step.config.tasks.is_some(),
            }),
            Fragment::InstallTool,
        ];
        if !job.registry.pull.is_empty() {
            fragments.push(Fragment::PullArtifact);
        }
        fragments.push(Fragment::Payload(job.step.script.clone()));
        if !job.registry.push.is_empty() {
            fragments.push(Fragment::PushArtifact);
        }
        fragments
    }

    /// Phase two inputs: values for every placeholder the script may use.
    pub fn script_params(&self, job: &ResolvedJob) -> Result<ParamSet> {
        let step = &job.step;
        let mut params = ParamSet::new();
        params.insert_env_default("jobid", JOBID_VAR, &job.jobid)?;
        params.insert_shell("outpath", step.workdir.as_str())?;
        params.insert_shell("registry", job.registry.host.as_str())?;
        params.insert("cores_per_task", step.config.cores_per_task.to_string())?;
        params.insert("nodes", step.config.nodes.to_string())?;
        if let Some(tasks) = step.config.tasks {
            params.insert("tasks", tasks.to_string())?;
        }
        params.insert_shell("arch", step.arch.as_str())?;
        params.insert_shell("tool_version", self.config.tools.version.as_str())?;
        params.insert_shell("tool_base_url", self.config.tools.base_url.as_str())?;
        params.insert(
            "plain_http_flag",
            if job.registry.plain_http {
                "--plain-http"
            } else {
                ""
            },
        )?;
        if !job.registry.pull.is_empty() {
            params.insert_shell("pull_tag", job.registry.pull.as_str())?;
        }
        if !job.registry.push.is_empty() {
            params.insert_shell("push_tag", job.registry.push.as_str())?;
        }
        Ok(params)
    }

    /// Compose and render the stage script without indentation.
    pub fn render_script(&self, job: &ResolvedJob) -> Result<String> {
        let fragments = self.fragments(job);
        if fragments.is_empty() {
            return Ok(String::new());
        }
        Template::text(compose(&fragments)).render(&self.script_params(job)?)
    }

    /// Assemble one stage: rendered script plus its manager document.
    pub fn assemble(&self, job: &JobStep) -> Result<AssembledJob> {
        let resolved = self.resolve(job);
        let script = self.render_script(&resolved)?;
        let document = render_document(&resolved, &script)?;

        debug!(
            workflow = %self.instance.metadata.name,
            job = %resolved.step.name,
            arch = %resolved.step.arch,
            pull = !resolved.registry.pull.is_empty(),
            push = !resolved.registry.push.is_empty(),
            "Assembled job script"
        );

        Ok(AssembledJob {
            name: resolved.step.name,
            script,
            document,
        })
    }
}

/// Assemble the script and manager document for one job step.
pub fn assemble_job_script(
    instance: &WorkflowInstance,
    job: &JobStep,
    config: &Config,
) -> Result<AssembledJob> {
    JobAssembler::new(instance, config).assemble(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{parse_workflow, validate_workflow};

    fn instance(extra_registry: &str, jobs: &str) -> WorkflowInstance {
        let yaml = format!(
            r#"
metadata:
  name: wf1
  namespace: ns1
spec:
  registry:
    name: registry
{}
  cluster:
    maxSize: 2
  workflow:
    completed: 1
    prefix: job_
  jobs:
{}"#,
            extra_registry, jobs
        );
        validate_workflow(&parse_workflow(&yaml).unwrap(), &Config::default()).unwrap()
    }

    const JOB_A: &str = r#"    - name: a
      image: ghcr.io/example/a
      script: |
        echo running a
        ./simulate --out result.dat
"#;

    #[test]
    fn test_defaults_are_total() {
        let wf = instance("", "    - name: a\n      image: x\n");
        let config = Config::default();
        let assembler = JobAssembler::new(&wf, &config);
        let resolved = assembler.resolve(&wf.spec.jobs[0]);
        assert_eq!(resolved.step.config.nodes, 1);
        assert_eq!(resolved.step.config.cores_per_task, 3);
        assert_eq!(resolved.step.arch, "amd64");
        assert_eq!(resolved.step.workdir, "/tmp/out");
        assert_eq!(resolved.step.config.gpu_label, "nvidia.com/gpu");
        assert_eq!(resolved.jobid, "job_wf1");

        // No script means no fragments at all
        let assembled = assembler.assemble(&wf.spec.jobs[0]).unwrap();
        assert!(assembled.script.is_empty());
    }

    #[test]
    fn test_family_default_cores_come_from_config() {
        let wf = instance("", "    - name: a\n      image: x\n      script: echo\n");
        let mut config = Config::default();
        config.jobs.cores_per_task = 6;
        let resolved = JobAssembler::new(&wf, &config).resolve(&wf.spec.jobs[0]);
        assert_eq!(resolved.step.config.cores_per_task, 6);
    }

    #[test]
    fn test_script_without_tags_has_no_registry_fragments() {
        let wf = instance("", JOB_A);
        let job = assemble_job_script(&wf, &wf.spec.jobs[0], &Config::default()).unwrap();

        assert!(job.script.contains("jobid=\"${JOBID:-job_wf1}\""));
        assert!(job.script.contains("outpath=\"/tmp/out\""));
        assert!(job
            .script
            .contains("registry=\"registry-0.wf1.ns1.svc.cluster.local:5000\""));
        assert!(job.script.contains("cores_per_task=3"));
        assert!(job.script.contains("nodes=1"));
        assert!(!job.script.contains("tasks="));
        assert!(job.script.contains("oras_${VERSION}_linux_amd64.tar.gz"));
        assert!(!job.script.contains("oras pull"));
        assert!(!job.script.contains("oras repo list"));
        assert!(!job.script.contains("oras push"));
        assert!(job.script.ends_with("./simulate --out result.dat\n"));
        assert!(!job.script.contains("{{"));
    }

    #[test]
    fn test_push_checks_exit_status_last() {
        let jobs = format!("{}      registry:\n        push: a\n", JOB_A);
        let wf = instance("", &jobs);
        let job = assemble_job_script(&wf, &wf.spec.jobs[0], &Config::default()).unwrap();

        let payload = job.script.find("./simulate").unwrap();
        let retval = job.script.find("retval=$?").unwrap();
        assert!(payload < retval);
        assert!(job.script.contains("exit 1"));
        assert!(job
            .script
            .trim_end()
            .ends_with("fi"));
        assert!(job
            .script
            .contains("oras push --plain-http $registry/${jobid}:a ."));
    }

    #[test]
    fn test_pull_fragment_checks_listing() {
        let jobs = format!("{}      registry:\n        pull: a\n", JOB_A);
        let wf = instance("", &jobs);
        let job = assemble_job_script(&wf, &wf.spec.jobs[0], &Config::default()).unwrap();

        let listed = job.script.find("oras repo list").unwrap();
        let pulled = job.script.find("oras pull").unwrap();
        assert!(listed < pulled);
        assert!(job.script.contains("oras pull $registry/${jobid}:a --plain-http"));
    }

    #[test]
    fn test_job_override_wins_over_spec_registry() {
        let jobs = format!(
            "{}      registry:\n        host: other.example.com\n        plainHttp: false\n        push: a\n",
            JOB_A
        );
        let wf = instance("    plainHttp: true", &jobs);
        let config = Config::default();
        let resolved = JobAssembler::new(&wf, &config).resolve(&wf.spec.jobs[0]);
        assert_eq!(resolved.registry.host, "other.example.com");
        assert!(!resolved.registry.plain_http);

        let job = assemble_job_script(&wf, &wf.spec.jobs[0], &config).unwrap();
        assert!(job.script.contains("registry=\"other.example.com\""));
        assert!(!job.script.contains("--plain-http"));
    }

    #[test]
    fn test_tag_only_override_keeps_spec_host() {
        let jobs = format!("{}      registry:\n        pull: a\n", JOB_A);
        let wf = instance("    plainHttp: false", &jobs);
        let config = Config::default();
        let resolved = JobAssembler::new(&wf, &config).resolve(&wf.spec.jobs[0]);
        assert_eq!(
            resolved.registry.host,
            "registry-0.wf1.ns1.svc.cluster.local:5000"
        );
        // The job has a registry block, so its own plain-http default applies
        assert!(resolved.registry.plain_http);
    }

    #[test]
    fn test_spec_level_plain_http_applies_without_override() {
        let wf = instance("    plainHttp: false", JOB_A);
        let config = Config::default();
        let resolved = JobAssembler::new(&wf, &config).resolve(&wf.spec.jobs[0]);
        assert!(!resolved.registry.plain_http);
    }

    #[test]
    fn test_user_placeholders_resolve() {
        let jobs = r#"    - name: a
      image: x
      arch: arm64
      config:
        tasks: 8
      script: run --tasks {{ tasks }} --out {{ outpath }}
"#;
        let wf = instance("", jobs);
        let job = assemble_job_script(&wf, &wf.spec.jobs[0], &Config::default()).unwrap();
        assert!(job.script.contains("run --tasks 8 --out /tmp/out"));
        assert!(job.script.contains("tasks=8"));
        assert!(job.script.contains("linux_arm64"));
    }

    #[test]
    fn test_unknown_user_placeholder_is_rejected() {
        let jobs = "    - name: a\n      image: x\n      script: echo {{ nope }}\n";
        let wf = instance("", jobs);
        let err = assemble_job_script(&wf, &wf.spec.jobs[0], &Config::default()).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_stages_share_artifact_repository() {
        let jobs = r#"    - name: a
      image: x
      registry:
        push: a
      script: ./simulate
    - name: b
      image: y
      registry:
        pull: a
      script: ./analyze
"#;
        let wf = instance("", jobs);
        let config = Config::default();
        let first = assemble_job_script(&wf, &wf.spec.jobs[0], &config).unwrap();
        let second = assemble_job_script(&wf, &wf.spec.jobs[1], &config).unwrap();

        let jobid = |script: &str| {
            script
                .lines()
                .find(|line| line.starts_with("jobid="))
                .map(str::to_string)
                .unwrap()
        };
        assert_eq!(jobid(&first.script), "jobid=\"${JOBID:-job_wf1}\"");
        assert_eq!(jobid(&first.script), jobid(&second.script));
        assert!(first
            .script
            .contains("oras push --plain-http $registry/${jobid}:a ."));
        assert!(second
            .script
            .contains("oras pull $registry/${jobid}:a --plain-http"));
    }

    #[test]
    fn test_unsafe_tool_settings_are_rejected() {
        let wf = instance("", JOB_A);
        let mut config = Config::default();
        config.tools.version = "1.2.0; id".to_string();
        let err = assemble_job_script(&wf, &wf.spec.jobs[0], &config).unwrap_err();
        assert!(err.to_string().contains("tool_version"));
    }
}
