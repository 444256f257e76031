//! Normalizing tool output into findings.
//!
//! Dispatch is a closed match over [`OutputFormat`]; each variant tolerates
//! malformed input by returning a single `parse-error` finding instead of
//! failing. Files a tool extracted are turned into findings by its
//! [`ArtifactRule`](crate::tools::ArtifactRule), independently of the format.

mod lines;
mod metadata;
mod signature;
pub mod vocabulary;

pub use lines::parse_lines;
pub use metadata::{parse_json, parse_key_value};
pub use signature::parse_signatures;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::error::TriageError;
use crate::finding::{Category, Confidence, Finding};
use crate::invoke::{ExitState, ToolInvocation};
use crate::tools::{OutputFormat, ToolDescriptor};

/// Default cap on findings kept per tool.
pub const DEFAULT_MAX_FINDINGS_PER_TOOL: usize = 100;

/// Result of one format parser: findings, or the parse-error finding that replaces them.
pub type Outcome = std::result::Result<Vec<Finding>, Finding>;

/// Build the single finding that stands in for unparsable output.
pub fn parse_error(tool: &str, message: String) -> Finding {
    let err = TriageError::Parse {
        tool: tool.to_string(),
        message,
    };
    Finding::new(tool, Category::ParseError, Confidence::Low, err.to_string())
}

/// Converts tool invocations into findings.
#[derive(Debug, Clone)]
pub struct ResultParser {
    max_findings_per_tool: usize,
}

impl Default for ResultParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FINDINGS_PER_TOOL)
    }
}

impl ResultParser {
    pub fn new(max_findings_per_tool: usize) -> Self {
        Self {
            max_findings_per_tool: max_findings_per_tool.max(1),
        }
    }

    /// Parse one invocation of `descriptor`.
    ///
    /// Timed-out and unstarted runs yield nothing; their status tells the
    /// story. Runs that exited with an unexpected code are only parsed when
    /// they produced standard output.
    pub fn parse(&self, invocation: &ToolInvocation, descriptor: &ToolDescriptor) -> Vec<Finding> {
        let tool = descriptor.name.as_str();
        let ok = match &invocation.exit {
            ExitState::Exited(code) => descriptor.is_ok_exit(*code),
            ExitState::Signaled => false,
            ExitState::TimedOut | ExitState::SpawnFailed(_) => return Vec::new(),
        };

        let stdout_text = invocation.stdout_text();
        let stderr_text = invocation.stderr_text();
        let stdout: &str = &stdout_text;
        let stderr: &str = &stderr_text;
        if !ok && stdout.trim().is_empty() {
            debug!(tool, exit = ?invocation.exit, "not parsing output of failed run");
            return Vec::new();
        }

        let outcome = match descriptor.format {
            OutputFormat::Json => parse_json(tool, stdout),
            OutputFormat::KeyValue => parse_key_value(tool, stdout),
            OutputFormat::Signature => parse_signatures(tool, stdout, &invocation.artifacts),
            OutputFormat::Lines if ok => parse_lines(descriptor, &[stdout, stderr]),
            OutputFormat::Lines => parse_lines(descriptor, &[stdout]),
        };

        let mut findings = match outcome {
            Ok(findings) => findings,
            Err(mut error) => {
                if invocation.truncated {
                    error.description.push_str(" (output was truncated)");
                }
                warn!(tool, reason = %error.description, "unparsable tool output");
                vec![error]
            }
        };

        findings.extend(artifact_findings(invocation, descriptor));
        self.cap(tool, findings)
    }

    fn cap(&self, tool: &str, mut findings: Vec<Finding>) -> Vec<Finding> {
        if findings.len() <= self.max_findings_per_tool {
            return findings;
        }
        let omitted = findings.len() - self.max_findings_per_tool;
        // stable, so equal-confidence findings keep output order
        findings.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        findings.truncate(self.max_findings_per_tool);
        findings.push(Finding::new(
            tool,
            Category::Unclassified,
            Confidence::Low,
            format!("{} further matches omitted", omitted),
        ));
        findings
    }
}

/// Findings for the files a tool left in its scratch directory.
fn artifact_findings(invocation: &ToolInvocation, descriptor: &ToolDescriptor) -> Vec<Finding> {
    let Some(rule) = &descriptor.artifacts else {
        return Vec::new();
    };
    let ignore = match build_globset(&rule.ignore) {
        Ok(set) => set,
        Err(e) => {
            warn!(tool = %descriptor.name, error = %e, "invalid artifact ignore pattern");
            GlobSet::empty()
        }
    };
    let prefix = format!("{}/", descriptor.name);

    invocation
        .artifacts
        .iter()
        .filter(|a| {
            let relative = a.path.strip_prefix(&prefix).unwrap_or(&a.path);
            !ignore.is_match(relative)
        })
        .map(|a| {
            let name = a.path.rsplit('/').next().unwrap_or(&a.path);
            Finding::new(
                &descriptor.name,
                rule.category,
                rule.confidence,
                format!("extracted {} ({} bytes)", name, a.size),
            )
            .with_artifact(a.clone())
        })
        .collect()
}

/// Compile glob patterns into one matcher.
pub fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
