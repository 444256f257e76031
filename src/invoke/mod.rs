//! Running external analyzers.
//!
//! [`ToolInvoker`] is the seam between the orchestrator and the operating
//! system. [`ProcessInvoker`] is the real implementation; tests substitute
//! scripted invokers. Every failure mode of a single tool (missing binary,
//! spawn error, crash, timeout) comes back as data inside a
//! [`ToolInvocation`], never as an error.

mod artifacts;
mod capture;
mod process;
pub mod template;

pub use artifacts::collect_artifacts;
pub use capture::{read_bounded, Captured};
pub use process::{ProcessInvoker, DEFAULT_PROBE_TIMEOUT_SECS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use crate::finding::ArtifactRef;
use crate::target::AnalysisTarget;
use crate::tools::{Availability, ToolDescriptor};

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 5 * 1024 * 1024;

/// Per-invocation settings supplied by the orchestrator.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub password: Option<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// Root of this run's scratch area; artifact paths are relative to it.
    pub scratch_root: PathBuf,
    /// Private directory for this tool, inside `scratch_root`.
    pub scratch_dir: PathBuf,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    /// The process exited with a status code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled,
    /// The timeout expired and the process was killed.
    TimedOut,
    /// The process could not be started.
    SpawnFailed(String),
}

/// Record of one tool run against one target.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit: ExitState,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Output exceeded the capture cap.
    pub truncated: bool,
    /// Non-empty files the tool left in its scratch directory.
    pub artifacts: Vec<ArtifactRef>,
}

impl ToolInvocation {
    /// Start a record for `tool`; fields are filled in as the run proceeds.
    pub fn begin(tool: &str) -> Self {
        let now = Utc::now();
        Self {
            tool: tool.to_string(),
            started_at: now,
            finished_at: now,
            exit: ExitState::SpawnFailed("not started".to_string()),
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
            artifacts: Vec::new(),
        }
    }

    /// Close the record with the given exit state.
    pub fn finish(mut self, exit: ExitState) -> Self {
        self.exit = exit;
        self.finished_at = Utc::now();
        self
    }

    pub fn with_output(mut self, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn timed_out(&self) -> bool {
        self.exit == ExitState::TimedOut
    }

    /// Whether the process ran to completion (whatever its exit code).
    pub fn completed(&self) -> bool {
        matches!(self.exit, ExitState::Exited(_) | ExitState::Signaled)
    }
}

/// Runs external analyzers.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Lightweight version/help invocation deciding whether a tool is usable.
    async fn probe(&self, descriptor: &ToolDescriptor) -> Availability;

    /// Run one tool against the target.
    ///
    /// Must not fail: every problem is described by the returned record.
    async fn run(
        &self,
        descriptor: &ToolDescriptor,
        target: &AnalysisTarget,
        options: &InvokeOptions,
    ) -> ToolInvocation;
}
