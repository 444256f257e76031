//! stegotriage - steganography and forensics triage.
//!
//! stegotriage runs a set of external analyzers (zsteg, steghide, outguess,
//! exiftool, binwalk, foremost, strings and any configured extras) against a
//! single file, normalizes their heterogeneous output into typed findings,
//! and merges them into one report with a verdict.
//!
//! # Architecture
//!
//! - `target`: builds the [`AnalysisTarget`] (size, sniffed type, SHA-256)
//! - `tools`: tool descriptors, the builtin catalog and the [`ToolRegistry`]
//! - `invoke`: the [`ToolInvoker`] seam and the process-backed implementation
//! - `parse`: turns raw tool output into [`Finding`]s
//! - `aggregate`: deduplication, ordering and the verdict policy
//! - `orchestrator`: one bounded, cancellable run from path to [`AnalysisReport`]
//! - `config`: YAML configuration file schema
//! - `report`: report types and output formatting (pretty, JSON)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stegotriage::{AnalyzeOptions, Orchestrator, ProcessInvoker, ToolRegistry};
//!
//! # async fn demo() -> stegotriage::Result<()> {
//! let orchestrator = Orchestrator::new(ToolRegistry::default(), Arc::new(ProcessInvoker::new()));
//! let report = orchestrator.analyze("sample.png", AnalyzeOptions::default()).await?;
//! println!("{}", report.verdict);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod finding;
pub mod invoke;
pub mod logging;
pub mod orchestrator;
pub mod parse;
pub mod report;
pub mod target;
pub mod tools;

pub use aggregate::{ReportAggregator, VerdictPolicy};
pub use config::Config;
pub use error::{Result, TriageError};
pub use finding::{ArtifactRef, Category, Confidence, Finding};
pub use invoke::{ExitState, InvokeOptions, ProcessInvoker, ToolInvocation, ToolInvoker};
pub use orchestrator::{AnalyzeOptions, Orchestrator, ProgressEvent, Settings};
pub use parse::ResultParser;
pub use report::{AnalysisReport, TargetSummary, ToolStatus, Verdict};
pub use target::{AnalysisTarget, FileKind};
pub use tools::{Availability, OutputFormat, ToolDescriptor, ToolRegistry};
