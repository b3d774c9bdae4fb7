use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use stagewright::config::Config;
use stagewright::controller::{Converger, TracingReporter};
use stagewright::manager::manager_config_data;
use stagewright::store::MemoryStore;
use stagewright::telemetry::{init_logging, LogConfig};
use stagewright::workflow::{parse_workflow_file, validate_workflow, WorkflowInstance};

#[derive(Parser)]
#[command(name = "stagewright")]
#[command(about = "Converge multi-stage workflow specs into cluster objects", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/stagewright/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow spec and show its stages
    Validate {
        /// Path to workflow YAML file
        file: PathBuf,
    },
    /// Show derived object names and the registry address
    Names {
        /// Path to workflow YAML file
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render the manager configuration entries
    Render {
        /// Path to workflow YAML file
        file: PathBuf,
        /// Write each entry to this directory instead of stdout
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Converge against an in-memory store and print the result
    Plan {
        /// Path to workflow YAML file
        file: PathBuf,
        /// Number of convergence passes to run
        #[arg(short, long, default_value = "1")]
        passes: u32,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default().verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file, &config)?,
        Commands::Names { file, json } => cmd_names(&file, &config, json)?,
        Commands::Render { file, output_dir } => {
            cmd_render(&file, &config, output_dir.as_deref()).await?
        }
        Commands::Plan { file, passes } => cmd_plan(&file, config, passes).await?,
        Commands::Completions { shell } => cmd_completions(shell)?,
    }

    Ok(())
}

/// Shell completion variants
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompletionShell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions
fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

fn load_validated(file: &Path, config: &Config) -> anyhow::Result<WorkflowInstance> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let parsed = parse_workflow_file(file)?;
    Ok(validate_workflow(&parsed, config)?)
}

fn cmd_validate(file: &Path, config: &Config) -> anyhow::Result<()> {
    let instance = load_validated(file, config)?;
    let spec = &instance.spec;

    println!(
        "✓ Workflow '{}' in namespace '{}' is valid",
        instance.name(),
        instance.namespace()
    );
    println!();
    println!("  Stages: {}", spec.stage_names().join(" -> "));
    println!("  Completions needed: {}", spec.workflow.completed_threshold);
    println!("  Max size: {}", spec.cluster.max_size);
    println!("  Events: {}", spec.workflow.events.len());
    if instance.has_in_cluster_registry() {
        println!("  Registry: in-cluster ({})", instance.registry_address());
    } else {
        println!("  Registry: external ({})", instance.registry_address());
    }

    Ok(())
}

fn cmd_names(file: &Path, config: &Config, json: bool) -> anyhow::Result<()> {
    let instance = load_validated(file, config)?;

    let registry = instance
        .has_in_cluster_registry()
        .then(|| instance.registry_name());
    let names = serde_json::json!({
        "service": instance.service_name(),
        "serviceAccount": instance.service_account_name(),
        "clusterRole": instance.cluster_role_name(),
        "role": instance.role_name(),
        "manager": instance.manager_name(),
        "registry": registry,
        "registryAddress": instance.registry_address(),
        "selector": instance.selector(),
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("{:<18} {}", "service", instance.service_name());
    println!("{:<18} {}", "service account", instance.service_account_name());
    println!("{:<18} {}", "cluster role", instance.cluster_role_name());
    println!("{:<18} {}", "role", instance.role_name());
    println!("{:<18} {}", "manager", instance.manager_name());
    if instance.has_in_cluster_registry() {
        println!("{:<18} {}", "registry", instance.registry_name());
    }
    println!("{:<18} {}", "registry address", instance.registry_address());
    Ok(())
}

async fn cmd_render(file: &Path, config: &Config, output_dir: Option<&Path>) -> anyhow::Result<()> {
    let instance = load_validated(file, config)?;
    let data = manager_config_data(&instance, config)?;

    match output_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            for (key, value) in &data {
                tokio::fs::write(dir.join(key), value).await?;
            }
            println!("✓ Wrote {} entries to {}", data.len(), dir.display());
        }
        None => {
            for (key, value) in &data {
                println!("# ---- {} ----", key);
                print!("{}", value);
                if !value.ends_with('\n') {
                    println!();
                }
            }
        }
    }

    Ok(())
}

async fn cmd_plan(file: &Path, config: Config, passes: u32) -> anyhow::Result<()> {
    let mut instance = parse_workflow_file(file)?;
    if instance.metadata.uid.is_none() {
        // The declarative-state API would have assigned one
        instance.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    }

    let store = MemoryStore::new();
    let converger =
        Converger::new(Arc::new(store.clone()), config).with_reporter(Arc::new(TracingReporter));

    for pass in 1..=passes.max(1) {
        let report = converger.converge(&instance).await?;
        println!(
            "Pass {}: {} created, {} already present",
            pass,
            report.created.len(),
            report.present.len()
        );
        for key in &report.created {
            println!("  + {}", key);
        }
    }

    println!();
    for resource in store.list().await {
        println!("---");
        print!("{}", serde_yaml::to_string(&resource.to_manifest()?)?);
    }

    Ok(())
}
