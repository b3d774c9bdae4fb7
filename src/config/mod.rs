//! Configuration management.
//!
//! stagewright configuration can come from:
//! - Environment variables (STAGEWRIGHT_*)
//! - Config file (~/.config/stagewright/config.toml)
//!
//! Every field has a default, so running without a config file is total.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// stagewright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default container images
    #[serde(default)]
    pub images: ImageConfig,

    /// Job family defaults
    #[serde(default)]
    pub jobs: JobDefaults,

    /// Registry client installed into every stage
    #[serde(default)]
    pub tools: ToolConfig,

    /// Manager deployment layout
    #[serde(default)]
    pub manager: ManagerConfig,
}

/// Images used when a workflow leaves them empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_manager_image")]
    pub manager: String,

    #[serde(default = "default_registry_image")]
    pub registry: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            manager: default_manager_image(),
            registry: default_registry_image(),
        }
    }
}

fn default_manager_image() -> String {
    "ghcr.io/converged-computing/state-machine-operator:manager".to_string()
}

fn default_registry_image() -> String {
    "ghcr.io/oras-project/registry:latest".to_string()
}

/// Defaults applied to every job step of this job family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefaults {
    #[serde(default = "default_nodes")]
    pub nodes: u32,

    #[serde(default = "default_cores_per_task")]
    pub cores_per_task: u32,

    #[serde(default = "default_arch")]
    pub arch: String,

    #[serde(default = "default_workdir")]
    pub workdir: String,

    #[serde(default = "default_gpu_label")]
    pub gpu_label: String,

    #[serde(default = "default_pull_policy")]
    pub pull_policy: String,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            cores_per_task: default_cores_per_task(),
            arch: default_arch(),
            workdir: default_workdir(),
            gpu_label: default_gpu_label(),
            pull_policy: default_pull_policy(),
        }
    }
}

fn default_nodes() -> u32 {
    1
}

fn default_cores_per_task() -> u32 {
    3
}

fn default_arch() -> String {
    "amd64".to_string()
}

fn default_workdir() -> String {
    "/tmp/out".to_string()
}

fn default_gpu_label() -> String {
    "nvidia.com/gpu".to_string()
}

pub(crate) fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

/// Artifact-registry client download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_tool_version")]
    pub version: String,

    /// Release download base URL
    #[serde(default = "default_tool_base_url")]
    pub base_url: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            version: default_tool_version(),
            base_url: default_tool_base_url(),
        }
    }
}

fn default_tool_version() -> String {
    "1.2.2".to_string()
}

fn default_tool_base_url() -> String {
    "https://github.com/oras-project/oras/releases/download".to_string()
}

/// Where the manager finds its configuration and what it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Mount path of the generated configuration object
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Manager program started by the entrypoint
    #[serde(default = "default_manager_command")]
    pub command: String,

    /// Key of the entrypoint script inside the configuration object
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            mount_path: default_mount_path(),
            command: default_manager_command(),
            entrypoint: default_entrypoint(),
        }
    }
}

fn default_mount_path() -> String {
    "/stagewright".to_string()
}

fn default_manager_command() -> String {
    "state-machine-manager".to_string()
}

fn default_entrypoint() -> String {
    "entrypoint.sh".to_string()
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&primary_path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit file, then apply env overrides.
    ///
    /// Unlike [`Config::load`], a missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let partial: PartialConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        let mut config = Self::default();
        config.apply_partial(partial);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("stagewright"))
            .unwrap_or_else(|| PathBuf::from(".stagewright"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(image) = std::env::var("STAGEWRIGHT_MANAGER_IMAGE") {
            self.images.manager = image;
        }
        if let Ok(image) = std::env::var("STAGEWRIGHT_REGISTRY_IMAGE") {
            self.images.registry = image;
        }
        if let Ok(cores) = std::env::var("STAGEWRIGHT_CORES_PER_TASK") {
            if let Ok(parsed) = cores.parse::<u32>() {
                self.jobs.cores_per_task = parsed;
            }
        }
        if let Ok(workdir) = std::env::var("STAGEWRIGHT_WORKDIR") {
            self.jobs.workdir = workdir;
        }
        if let Ok(version) = std::env::var("STAGEWRIGHT_ORAS_VERSION") {
            self.tools.version = version;
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(images) = partial.images {
            self.images = images;
        }
        if let Some(jobs) = partial.jobs {
            self.jobs = jobs;
        }
        if let Some(tools) = partial.tools {
            self.tools = tools;
        }
        if let Some(manager) = partial.manager {
            self.manager = manager;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    images: Option<ImageConfig>,
    jobs: Option<JobDefaults>,
    tools: Option<ToolConfig>,
    manager: Option<ManagerConfig>,
}
