//! Catalog of external analyzers and how to drive them.
//!
//! A [`ToolDescriptor`] says how to invoke one analyzer (argv template,
//! timeout, accepted exit codes), which files it applies to, and how its
//! output is interpreted ([`OutputFormat`], optional custom vocabulary and
//! artifact rule). The builtin set lives in `catalog`; configuration files
//! can add tools or override builtins by name.

mod catalog;
mod registry;

pub use catalog::builtin_tools;
pub use registry::{Availability, PlanOptions, ToolPlan, ToolRegistry};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::finding::{Category, Confidence};
use crate::target::FileKind;

/// Default per-tool timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How a tool's raw output is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// `Key : value` metadata blocks.
    KeyValue,
    /// Line-oriented output matched against pattern tables.
    Lines,
    /// A JSON document (array or object of metadata records).
    Json,
    /// Offset/description signature tables (`DECIMAL HEXADECIMAL DESCRIPTION`).
    Signature,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::KeyValue => "key-value",
            OutputFormat::Lines => "lines",
            OutputFormat::Json => "json",
            OutputFormat::Signature => "signature",
        }
    }
}

/// Capability flags that change how a tool is scheduled or invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Takes `{password}`; an empty string is substituted when none is given.
    AcceptsPassword,
    /// Takes `{password}` and is skipped when none is given.
    RequiresPassword,
    /// Writes files into its scratch directory.
    ExtractsFiles,
    /// Only meaningful on image files, whatever `file_kinds` says.
    ImageOnly,
}

/// A regex in a tool's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub regex: String,
    pub category: Category,
    pub confidence: Confidence,
    /// Description template; `{line}` is replaced by the matching line.
    #[serde(default)]
    pub description: Option<String>,
}

/// Turns files left in the scratch directory into findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRule {
    pub category: Category,
    pub confidence: Confidence,
    /// Glob patterns, relative to the tool's scratch directory, to leave out.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Registry entry describing how to invoke and interpret one analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    /// Binary to run; defaults to `name`.
    #[serde(default)]
    pub program: Option<String>,
    /// Argument template with `{target}`, `{scratch}` and `{password}` placeholders.
    pub args: Vec<String>,
    pub format: OutputFormat,
    /// File kinds the tool applies to; empty means any.
    #[serde(default)]
    pub file_kinds: Vec<FileKind>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Exit codes that count as a successful run.
    #[serde(default = "default_ok_exit_codes")]
    pub ok_exit_codes: Vec<i32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Alternative probe argument lists, tried in order.
    #[serde(default = "default_probe_args")]
    pub probe_args: Vec<Vec<String>>,
    /// Exit codes that count as a successful probe.
    #[serde(default = "default_ok_exit_codes")]
    pub probe_exit_codes: Vec<i32>,
    /// Extra vocabulary; consulted before the builtin tables.
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
    #[serde(default)]
    pub artifacts: Option<ArtifactRule>,
}

fn default_ok_exit_codes() -> Vec<i32> {
    vec![0]
}

fn default_probe_args() -> Vec<Vec<String>> {
    vec![vec!["--version".to_string()], vec!["-h".to_string()]]
}

impl ToolDescriptor {
    /// Create a descriptor with defaults for everything but the essentials.
    pub fn new(name: &str, args: &[&str], format: OutputFormat) -> Self {
        Self {
            name: name.to_string(),
            program: None,
            args: args.iter().map(|a| a.to_string()).collect(),
            format,
            file_kinds: Vec::new(),
            capabilities: Vec::new(),
            ok_exit_codes: default_ok_exit_codes(),
            timeout_secs: None,
            probe_args: default_probe_args(),
            probe_exit_codes: default_ok_exit_codes(),
            patterns: Vec::new(),
            artifacts: None,
        }
    }

    pub fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(&self.name)
    }

    /// Effective timeout, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn extracts_files(&self) -> bool {
        self.has_capability(Capability::ExtractsFiles)
    }

    /// Whether the tool can run against a file of this kind.
    pub fn applies_to(&self, kind: FileKind) -> bool {
        if self.has_capability(Capability::ImageOnly) && !kind.is_image() {
            return false;
        }
        self.file_kinds.is_empty() || self.file_kinds.contains(&kind)
    }

    pub fn is_ok_exit(&self, code: i32) -> bool {
        self.ok_exit_codes.contains(&code)
    }

    // Builder helpers used by the catalog.

    pub(crate) fn kinds(mut self, kinds: &[FileKind]) -> Self {
        self.file_kinds = kinds.to_vec();
        self
    }

    pub(crate) fn caps(mut self, caps: &[Capability]) -> Self {
        self.capabilities = caps.to_vec();
        self
    }

    pub(crate) fn ok_codes(mut self, codes: &[i32]) -> Self {
        self.ok_exit_codes = codes.to_vec();
        self
    }

    pub(crate) fn probe(mut self, args: &[&[&str]], codes: &[i32]) -> Self {
        self.probe_args = args
            .iter()
            .map(|a| a.iter().map(|s| s.to_string()).collect())
            .collect();
        self.probe_exit_codes = codes.to_vec();
        self
    }

    pub(crate) fn extracted(mut self, category: Category, confidence: Confidence, ignore: &[&str]) -> Self {
        self.artifacts = Some(ArtifactRule {
            category,
            confidence,
            ignore: ignore.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}
