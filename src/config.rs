//! Configuration for benchmark runs.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (and their PODSPEED_* environment variables)
//! 2. Config file (`--config`, else `.podspeed/config.yaml`)
//! 3. Defaults (namespace `default`, type `basic`, one pod)
//!
//! Without an explicit type, a run from a template is named after the
//! template file.
//!
//! Config file discovery:
//! - Searches current directory and parents for .podspeed/config.yaml
//! - Falls back to the user config directory (podspeed/config.yaml)
//! - A relative `template` path is resolved against the project root
//!   (the directory holding `.podspeed/`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{RunOptions, DEFAULT_EVENT_BUFFER};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub pod_type: Option<String>,
    pub pods: Option<usize>,
    /// Pod manifest used instead of a built-in type
    pub template: Option<String>,
    pub skip_delete: Option<bool>,
    pub sequential: Option<bool>,
    pub collect_delete_timings: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub event_buffer: Option<usize>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub pod_type: Option<String>,
    pub pods: Option<usize>,
    pub template: Option<PathBuf>,
    pub skip_delete: Option<bool>,
    pub sequential: Option<bool>,
    pub collect_delete_timings: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub event_buffer: Option<usize>,
}

/// Fully resolved settings of one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub namespace: String,
    /// Template name (also the pod name prefix)
    pub pod_type: String,
    pub pods: usize,
    /// Pod manifest overriding the built-in template
    pub template: Option<PathBuf>,
    /// Config file that was applied (if any)
    pub config_file: Option<PathBuf>,
    pub options: RunOptions,
}

impl BenchConfig {
    /// Merge command-line overrides over an optional config file
    pub fn resolve(file: Option<(&Path, &ConfigFile)>, overrides: &Overrides) -> Self {
        let empty = ConfigFile::default();
        let (config_path, config) = match file {
            Some((path, config)) => (Some(path), config),
            None => (None, &empty),
        };

        let template = overrides.template.clone().or_else(|| {
            let template = config.template.as_ref()?;
            let base = config_path.map(project_root).unwrap_or_else(|| PathBuf::from("."));
            Some(resolve_path(&base, template))
        });

        let timeout_seconds = overrides.timeout_seconds.or(config.timeout_seconds);

        Self {
            namespace: overrides
                .namespace
                .clone()
                .or_else(|| config.namespace.clone())
                .unwrap_or_else(|| "default".to_string()),
            pod_type: overrides
                .pod_type
                .clone()
                .or_else(|| config.pod_type.clone())
                .unwrap_or_else(|| match &template {
                    Some(path) => template_type(path),
                    None => "basic".to_string(),
                }),
            pods: overrides.pods.or(config.pods).unwrap_or(1),
            template,
            config_file: config_path.map(Path::to_path_buf),
            options: RunOptions {
                skip_delete: overrides.skip_delete.or(config.skip_delete).unwrap_or(false),
                sequential: overrides.sequential.or(config.sequential).unwrap_or(false),
                collect_delete_timings: overrides
                    .collect_delete_timings
                    .or(config.collect_delete_timings)
                    .unwrap_or(false),
                timeout: timeout_seconds.map(Duration::from_secs),
                event_buffer: overrides
                    .event_buffer
                    .or(config.event_buffer)
                    .unwrap_or(DEFAULT_EVENT_BUFFER),
            },
        }
    }

    /// Reject settings a run cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.pods < 1 {
            anyhow::bail!("--pods must not be smaller than 1");
        }
        if self.options.event_buffer < 1 {
            anyhow::bail!("event_buffer must not be smaller than 1");
        }
        if self.namespace.is_empty() {
            anyhow::bail!("Namespace cannot be empty");
        }
        if matches!(self.options.timeout, Some(t) if t.is_zero()) {
            anyhow::bail!("Timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Load configuration from all sources
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<BenchConfig> {
    let config_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let config = match &config_path {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    let resolved = BenchConfig::resolve(
        config_path.as_deref().zip(config.as_ref()),
        overrides,
    );
    resolved.validate()?;
    Ok(resolved)
}

/// Find config file by searching current directory and parents
pub fn find_config_file() -> Option<PathBuf> {
    let current = std::env::current_dir().ok()?;
    find_config_file_from(&current).or_else(|| {
        let user = dirs::config_dir()?.join("podspeed").join("config.yaml");
        user.exists().then_some(user)
    })
}

fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".podspeed").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Directory relative template paths are resolved against
fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    if parent.file_name().is_some_and(|name| name == ".podspeed") {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Pod type named after a template file: `manifests/My Pod.yaml` is `my-pod`
fn template_type(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let name = name.trim_matches('-');

    if name.is_empty() {
        "custom".to_string()
    } else {
        name.to_string()
    }
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
