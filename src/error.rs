//! Error taxonomy for triage runs.
//!
//! [`TriageError::TargetUnreadable`], [`TriageError::UnknownTool`],
//! [`TriageError::Canceled`] and [`TriageError::DeadlineExceeded`] abort a run.
//! So do [`TriageError::Scratch`], since no extracting tool can run without
//! its scratch root, and [`TriageError::Config`], which is raised before any
//! run starts. The tool-level variants are never returned from a run; they
//! render tool failures in logs the same way they would if they were raised.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while triaging a file.
#[derive(Error, Debug)]
pub enum TriageError {
    /// The input file could not be opened or stat'ed.
    #[error("cannot read target {}: {source}", .path.display())]
    TargetUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A registry lookup named a tool that is not in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tool binary is missing or its probe failed.
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The tool exceeded its timeout and was terminated.
    #[error("tool {tool} timed out after {}s", .timeout.as_secs_f64())]
    ToolTimeout { tool: String, timeout: Duration },

    /// Tool output could not be interpreted.
    #[error("could not parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// The caller canceled the run.
    #[error("analysis canceled")]
    Canceled,

    /// The run exceeded the caller's overall deadline.
    #[error("analysis exceeded its deadline of {}s", .0.as_secs_f64())]
    DeadlineExceeded(Duration),

    /// The per-run scratch area could not be created.
    #[error("cannot prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    /// Invalid configuration file or options.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TriageError {
    /// Whether this error stops the whole run rather than being recorded in
    /// the report.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TriageError::ToolUnavailable(_)
                | TriageError::ToolTimeout { .. }
                | TriageError::Parse { .. }
        )
    }

    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            TriageError::TargetUnreadable { .. } => crate::cli::EXIT_TARGET_UNREADABLE,
            TriageError::Canceled | TriageError::DeadlineExceeded(_) => crate::cli::EXIT_CANCELED,
            _ => crate::cli::EXIT_USAGE,
        }
    }
}

/// Result alias for triage operations.
pub type Result<T> = std::result::Result<T, TriageError>;
