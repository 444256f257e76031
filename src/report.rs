//! The analysis report and its output formats.
//!
//! Supports two output formats:
//! - JSON: the report object consumed by launchers and GUI wrappers
//! - Pretty: colored terminal summary for humans

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::finding::{Category, Confidence, Finding};
use crate::invoke::{ExitState, ToolInvocation};
use crate::target::AnalysisTarget;
use crate::tools::ToolDescriptor;

/// Top-level classification of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Suspicious,
    Positive,
    Inconclusive,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Clean => "clean",
            Verdict::Suspicious => "suspicious",
            Verdict::Positive => "positive",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to one tool during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolStatus {
    RanOk,
    Unavailable,
    Failed,
    TimedOut,
    Skipped,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::RanOk => "ran-ok",
            ToolStatus::Unavailable => "unavailable",
            ToolStatus::Failed => "failed",
            ToolStatus::TimedOut => "timed-out",
            ToolStatus::Skipped => "skipped",
        }
    }

    /// Status of a finished invocation, judged by the tool's accepted exit codes.
    pub fn from_invocation(invocation: &ToolInvocation, descriptor: &ToolDescriptor) -> Self {
        match &invocation.exit {
            ExitState::Exited(code) if descriptor.is_ok_exit(*code) => ToolStatus::RanOk,
            ExitState::TimedOut => ToolStatus::TimedOut,
            _ => ToolStatus::Failed,
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `target` object of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Lowercase hex SHA-256.
    pub hash: String,
}

impl From<&AnalysisTarget> for TargetSummary {
    fn from(target: &AnalysisTarget) -> Self {
        Self {
            path: target.path.to_string_lossy().into_owned(),
            size: target.size,
            file_type: target.file_type().to_string(),
            hash: target.sha256.clone(),
        }
    }
}

/// Terminal artifact of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub target: TargetSummary,
    pub findings: Vec<Finding>,
    pub tool_status: BTreeMap<String, ToolStatus>,
    pub verdict: Verdict,
    pub generated_at: DateTime<Utc>,
    /// Where extracted artifacts were kept, when they were kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<String>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Findings in a category, in report order.
    pub fn findings_in(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }

    pub fn count_with_status(&self, status: ToolStatus) -> usize {
        self.tool_status.values().filter(|s| **s == status).count()
    }
}

// =============================================================================
// JSON Format
// =============================================================================

/// Print the report as JSON on stdout.
pub fn write_json(report: &AnalysisReport) -> anyhow::Result<()> {
    let json = report.to_json()?;
    println!("{}", json);
    Ok(())
}

/// Save the report as JSON to `path`.
pub fn save_json(report: &AnalysisReport, path: &Path) -> anyhow::Result<()> {
    let json = report.to_json()?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write the report in pretty (human-readable) format.
pub fn write_pretty(report: &AnalysisReport) {
    // Header
    println!();
    print!("  ");
    print!("{}", "stegotriage".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // Target info
    print!("  {}", "Target: ".dimmed());
    println!("{}", report.target.path);
    print!("  {}", "Type:   ".dimmed());
    println!("{} ({} bytes)", report.target.file_type, report.target.size);
    print!("  {}", "SHA256: ".dimmed());
    println!("{}", report.target.hash);
    println!();

    write_tool_status(&report.tool_status);
    println!();

    if report.findings.is_empty() {
        println!("  {}", "No findings.".dimmed());
    } else {
        write_findings(&report.findings);
    }
    println!();

    if let Some(dir) = &report.artifacts_dir {
        print!("  {}", "Artifacts: ".dimmed());
        println!("{}", dir);
        println!();
    }

    write_verdict(report.verdict);
    println!();
}

fn write_tool_status(statuses: &BTreeMap<String, ToolStatus>) {
    println!("  {}", "Tools:".bold());
    for (name, status) in statuses {
        print!("    {:<12}", name);
        write_status_tag(*status);
        println!();
    }
}

fn write_status_tag(status: ToolStatus) {
    match status {
        ToolStatus::RanOk => print!("{}", "ran-ok".green()),
        ToolStatus::Unavailable => print!("{}", "unavailable".yellow()),
        ToolStatus::Failed => print!("{}", "failed".red()),
        ToolStatus::TimedOut => print!("{}", "timed-out".red()),
        ToolStatus::Skipped => print!("{}", "skipped".dimmed()),
    }
}

fn write_findings(findings: &[Finding]) {
    println!("  {} ({}):", "Findings".bold(), findings.len());
    println!();

    for f in findings {
        write_confidence_tag(f.confidence);
        print!("   ");
        print!("{:<18}", f.category.as_str().dimmed());
        print!("{}", f.tool.blue());
        if !f.corroborated_by.is_empty() {
            print!("{}", format!(" (+{})", f.corroborated_by.join(", ")).dimmed());
        }
        println!();

        // Description on next line, indented
        println!("            {}", f.description);
        if let Some(a) = &f.artifact {
            println!("            {}", format!("artifact: {} ({} bytes)", a.path, a.size).dimmed());
        }
        println!();
    }
}

fn write_confidence_tag(confidence: Confidence) {
    match confidence {
        Confidence::High => print!("    {} ", "HIGH".red()),
        Confidence::Medium => print!("    {} ", "MED ".yellow()),
        Confidence::Low => print!("    {} ", "LOW ".blue()),
    }
}

fn write_verdict(verdict: Verdict) {
    print!("  Verdict: ");
    match verdict {
        Verdict::Clean => print!("{}", "CLEAN".green().bold()),
        Verdict::Inconclusive => print!("{}", "INCONCLUSIVE".yellow()),
        Verdict::Suspicious => print!("{}", "SUSPICIOUS".yellow().bold()),
        Verdict::Positive => print!("{}", "POSITIVE".red().bold()),
    }
    println!();
}
