//! Configuration file schema for stegotriage.
//!
//! A configuration file adjusts where tools are found, how long they may run,
//! which of them are used, and how the verdict is decided. Every key is
//! optional; an empty file means the builtin defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::VerdictPolicy;
use crate::error::{Result, TriageError};
use crate::invoke::{template, ProcessInvoker, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::orchestrator::{default_concurrency, Settings};
use crate::parse::{build_globset, DEFAULT_MAX_FINDINGS_PER_TOOL};
use crate::tools::{builtin_tools, ToolDescriptor, ToolRegistry, DEFAULT_TIMEOUT_SECS};

/// File names looked for during discovery, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["stegotriage.yaml", ".stegotriage.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Directories searched for tool binaries before `PATH`.
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
    /// Whether `PATH` is searched after `search_path` (default: true)
    #[serde(default)]
    pub use_system_path: Option<bool>,
    /// Per-tool timeout in seconds for tools without their own (default: 30)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Timeout for availability probes in seconds (default: 5)
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
    /// Cap on captured bytes per output stream (default: 5 MiB)
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
    /// Tools run at once (default: processor threads, at most 8)
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Findings kept per tool before the rest are summarized (default: 100)
    #[serde(default)]
    pub max_findings_per_tool: Option<usize>,
    /// Keep extracted artifacts under this directory.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
    /// Tools treated as unavailable without probing.
    #[serde(default)]
    pub disabled_tools: Vec<String>,
    /// Custom tools, or overrides of builtin tools with the same name.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub verdict: Option<VerdictPolicy>,
}

impl Config {
    /// Parse a configuration file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| TriageError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| TriageError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from YAML text. Empty text yields the defaults.
    pub fn parse_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| TriageError::Config(e.to_string()))
    }

    /// Find a configuration file: first in `dir`, then in the user config directory.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let user_dir = directories::ProjectDirs::from("", "", "stegotriage")
            .map(|dirs| dirs.config_dir().to_path_buf());

        std::iter::once(dir.to_path_buf())
            .chain(user_dir)
            .flat_map(|d| CONFIG_FILE_NAMES.iter().map(move |name| d.join(name)))
            .find(|p| p.is_file())
    }

    /// Load `explicit` if given, otherwise a discovered file, otherwise the
    /// defaults. The result is validated.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        let source = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::discover(dir),
        };
        let config = match &source {
            Some(p) => Self::parse_file(p)?,
            None => Self::default(),
        };
        validate(&config)?;
        Ok((config, source))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency)
    }

    /// Builtin tools with this configuration's tools merged in by name.
    pub fn tool_catalog(&self) -> Vec<ToolDescriptor> {
        let mut tools = builtin_tools();
        tools.extend(self.tools.iter().cloned());
        tools
    }

    /// A registry over [`Config::tool_catalog`] with disabled tools applied.
    pub fn registry(&self) -> Result<ToolRegistry> {
        let registry = ToolRegistry::new(self.tool_catalog());
        registry.disable(self.disabled_tools.as_slice())?;
        Ok(registry)
    }

    pub fn invoker(&self) -> ProcessInvoker {
        ProcessInvoker::new()
            .search_path(self.search_path.clone())
            .use_system_path(self.use_system_path.unwrap_or(true))
            .probe_timeout(self.probe_timeout())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            default_timeout: self.timeout(),
            max_output_bytes: self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
            concurrency: self.concurrency(),
            max_findings_per_tool: self
                .max_findings_per_tool
                .unwrap_or(DEFAULT_MAX_FINDINGS_PER_TOOL),
            artifacts_dir: self.artifacts_dir.clone(),
            policy: self.verdict.clone().unwrap_or_default(),
        }
    }
}

/// Validate a configuration for correctness.
pub fn validate(config: &Config) -> Result<()> {
    let invalid = |msg: String| -> Result<()> { Err(TriageError::Config(msg)) };

    if config.concurrency == Some(0) {
        return invalid("concurrency must be at least 1".to_string());
    }
    if config.timeout_secs == Some(0) {
        return invalid("timeout_secs must be at least 1".to_string());
    }
    if config.probe_timeout_secs == Some(0) {
        return invalid("probe_timeout_secs must be at least 1".to_string());
    }
    if config.max_output_bytes == Some(0) {
        return invalid("max_output_bytes must be at least 1".to_string());
    }
    if config.max_findings_per_tool == Some(0) {
        return invalid("max_findings_per_tool must be at least 1".to_string());
    }

    for tool in &config.tools {
        if tool.name.trim().is_empty() {
            return invalid("tool with empty name".to_string());
        }
        if tool.args.is_empty() {
            return invalid(format!("tool {:?} has no arguments", tool.name));
        }
        template::validate(&tool.args)
            .map_err(|e| TriageError::Config(format!("tool {:?}: {}", tool.name, e)))?;
        if tool.timeout_secs == Some(0) {
            return invalid(format!("tool {:?}: timeout_secs must be at least 1", tool.name));
        }

        // Validate vocabulary patterns compile
        for p in &tool.patterns {
            regex::Regex::new(&p.regex).map_err(|e| {
                TriageError::Config(format!("tool {:?}: invalid pattern {:?}: {}", tool.name, p.regex, e))
            })?;
        }

        // Validate artifact ignore globs compile
        if let Some(rule) = &tool.artifacts {
            build_globset(&rule.ignore).map_err(|e| {
                TriageError::Config(format!("tool {:?}: invalid ignore pattern: {}", tool.name, e))
            })?;
        }
    }

    let catalog = config.tool_catalog();
    for name in &config.disabled_tools {
        if !catalog.iter().any(|t| &t.name == name) {
            return invalid(format!("disabled_tools names unknown tool {:?}", name));
        }
    }

    Ok(())
}
