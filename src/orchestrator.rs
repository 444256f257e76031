//! Orchestration of one triage run.
//!
//! [`Orchestrator::analyze`] builds the target, asks the registry which tools
//! apply, runs them through a bounded worker pool, parses each invocation and
//! hands the findings to the aggregator. Cancellation and the optional
//! deadline drop the in-flight run; dropping a run kills its child processes,
//! so nothing outlives a canceled call and no partial report is returned.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::aggregate::{ReportAggregator, VerdictPolicy};
use crate::error::{Result, TriageError};
use crate::finding::Finding;
use crate::invoke::{InvokeOptions, ToolInvoker, DEFAULT_MAX_OUTPUT_BYTES};
use crate::parse::{ResultParser, DEFAULT_MAX_FINDINGS_PER_TOOL};
use crate::report::{AnalysisReport, TargetSummary, ToolStatus};
use crate::target::AnalysisTarget;
use crate::tools::{PlanOptions, ToolDescriptor, ToolRegistry, DEFAULT_TIMEOUT_SECS};

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_CONCURRENCY: usize = 8;

/// Default worker count: available processor threads, capped.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CONCURRENCY)
}

/// Settings shared by every run of an orchestrator.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Timeout for tools that do not set their own.
    pub default_timeout: Duration,
    pub max_output_bytes: usize,
    pub concurrency: usize,
    pub max_findings_per_tool: usize,
    /// Keep scratch directories under this directory instead of a temporary one.
    pub artifacts_dir: Option<PathBuf>,
    pub policy: VerdictPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            concurrency: default_concurrency(),
            max_findings_per_tool: DEFAULT_MAX_FINDINGS_PER_TOOL,
            artifacts_dir: None,
            policy: VerdictPolicy::default(),
        }
    }
}

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// Tool selection is done; `tools` are about to run.
    Planned {
        target: String,
        tools: Vec<String>,
        unavailable: Vec<String>,
        skipped: Vec<String>,
    },
    /// One tool finished and its output was parsed.
    ToolFinished {
        tool: String,
        status: ToolStatus,
        findings: usize,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
        completed: usize,
        total: usize,
    },
}

/// Per-call options for [`Orchestrator::analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub password: Option<String>,
    /// Run only these tools; the rest are reported as skipped.
    pub only_tools: Option<Vec<String>>,
    /// Overall limit for the whole call.
    pub deadline: Option<Duration>,
    pub progress: Option<UnboundedSender<ProgressEvent>>,
}

impl AnalyzeOptions {
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn only_tools<S: Into<String>>(mut self, tools: impl IntoIterator<Item = S>) -> Self {
        self.only_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // a closed receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }
}

/// Coordinates registry, invoker, parser and aggregator for triage runs.
pub struct Orchestrator {
    registry: ToolRegistry,
    invoker: Arc<dyn ToolInvoker>,
    parser: ResultParser,
    aggregator: ReportAggregator,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(registry: ToolRegistry, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self::with_settings(registry, invoker, Settings::default())
    }

    pub fn with_settings(registry: ToolRegistry, invoker: Arc<dyn ToolInvoker>, settings: Settings) -> Self {
        Self {
            registry,
            invoker,
            parser: ResultParser::new(settings.max_findings_per_tool),
            aggregator: ReportAggregator::new(settings.policy.clone()),
            settings,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Forget cached tool availability and probe again.
    pub async fn refresh_tools(&self) {
        self.registry.refresh(self.invoker.as_ref()).await;
    }

    /// Analyze the file at `path`.
    pub async fn analyze(&self, path: impl AsRef<Path>, options: AnalyzeOptions) -> Result<AnalysisReport> {
        self.analyze_until(path, options, std::future::pending()).await
    }

    /// Analyze the file at `path`, giving up with [`TriageError::Canceled`]
    /// as soon as `cancel` completes.
    pub async fn analyze_until<F>(
        &self,
        path: impl AsRef<Path>,
        options: AnalyzeOptions,
        cancel: F,
    ) -> Result<AnalysisReport>
    where
        F: Future<Output = ()>,
    {
        let path = path.as_ref();
        let deadline = options.deadline;

        let bounded = async {
            match deadline {
                Some(limit) => tokio::time::timeout(limit, self.run(path, &options))
                    .await
                    .map_err(|_| TriageError::DeadlineExceeded(limit))?,
                None => self.run(path, &options).await,
            }
        };

        tokio::select! {
            result = bounded => {
                if let Err(TriageError::DeadlineExceeded(limit)) = &result {
                    warn!(path = %path.display(), deadline_s = limit.as_secs_f64(), "analysis exceeded its deadline");
                }
                result
            }
            _ = cancel => {
                info!(path = %path.display(), "analysis canceled");
                Err(TriageError::Canceled)
            }
        }
    }

    async fn run(&self, path: &Path, options: &AnalyzeOptions) -> Result<AnalysisReport> {
        let target = build_target(path).await?;
        info!(
            path = %target.path.display(),
            kind = %target.kind,
            size = target.size,
            sha256 = %target.sha256,
            "analysis started"
        );

        let only = match &options.only_tools {
            Some(names) => {
                for name in names {
                    self.registry.describe(name)?;
                }
                Some(names.iter().cloned().collect::<HashSet<String>>())
            }
            None => None,
        };

        self.registry.ensure_probed(self.invoker.as_ref()).await;
        let plan = self.registry.plan(
            &target,
            &PlanOptions {
                only,
                has_password: options.password.is_some(),
            },
        );

        let runnable: Vec<String> = plan.runnable.iter().map(|t| t.name.clone()).collect();
        info!(
            tools = ?runnable,
            unavailable = ?plan.unavailable,
            skipped = plan.skipped.len(),
            "tools selected"
        );
        options.emit(ProgressEvent::Planned {
            target: target.path.to_string_lossy().into_owned(),
            tools: runnable,
            unavailable: plan.unavailable.clone(),
            skipped: plan.skipped.iter().map(|(n, _)| n.clone()).collect(),
        });

        let scratch = Scratch::create(self.settings.artifacts_dir.as_deref(), &target)?;

        let total = plan.runnable.len();
        let completed = AtomicUsize::new(0);
        let target_ref = &target;
        let scratch_root = scratch.root();
        let completed_ref = &completed;

        let outcomes: Vec<(String, ToolStatus, Vec<Finding>)> = stream::iter(plan.runnable)
            .map(|descriptor| async move {
                let invoke_options = InvokeOptions {
                    password: options.password.clone(),
                    timeout: descriptor.timeout(self.settings.default_timeout),
                    max_output_bytes: self.settings.max_output_bytes,
                    scratch_root: scratch_root.to_path_buf(),
                    scratch_dir: scratch_root.join(&descriptor.name),
                };
                self.run_tool(&descriptor, target_ref, &invoke_options, options, completed_ref, total)
                    .await
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut tool_status: BTreeMap<String, ToolStatus> = BTreeMap::new();
        let mut findings = Vec::new();
        for (name, status, tool_findings) in outcomes {
            tool_status.insert(name, status);
            findings.extend(tool_findings);
        }
        for name in plan.unavailable {
            tool_status.insert(name, ToolStatus::Unavailable);
        }
        for (name, reason) in plan.skipped {
            debug!(tool = %name, reason = %reason, "tool skipped");
            tool_status.insert(name, ToolStatus::Skipped);
        }

        let (findings, verdict) = self.aggregator.aggregate(findings, &tool_status);
        let artifacts_dir = scratch.finish();
        info!(
            verdict = %verdict,
            findings = findings.len(),
            "analysis finished"
        );

        Ok(AnalysisReport {
            target: TargetSummary::from(&target),
            findings,
            tool_status,
            verdict,
            generated_at: Utc::now(),
            artifacts_dir: artifacts_dir.map(|p| p.to_string_lossy().into_owned()),
        })
    }

    async fn run_tool(
        &self,
        descriptor: &ToolDescriptor,
        target: &AnalysisTarget,
        invoke_options: &InvokeOptions,
        options: &AnalyzeOptions,
        completed: &AtomicUsize,
        total: usize,
    ) -> (String, ToolStatus, Vec<Finding>) {
        let invocation = self.invoker.run(descriptor, target, invoke_options).await;
        let status = ToolStatus::from_invocation(&invocation, descriptor);
        let findings = self.parser.parse(&invocation, descriptor);

        match status {
            ToolStatus::TimedOut => warn!(
                tool = %descriptor.name,
                error = %TriageError::ToolTimeout {
                    tool: descriptor.name.clone(),
                    timeout: invoke_options.timeout,
                },
                "tool timed out"
            ),
            ToolStatus::Failed => warn!(
                tool = %descriptor.name,
                exit = ?invocation.exit,
                stderr = %crate::parse::vocabulary::clip(invocation.stderr_text().trim(), 200),
                "tool failed"
            ),
            _ => {}
        }

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        options.emit(ProgressEvent::ToolFinished {
            tool: descriptor.name.clone(),
            status,
            findings: findings.len(),
            elapsed_ms: invocation.elapsed().as_millis() as u64,
            completed: done,
            total,
        });

        (descriptor.name.clone(), status, findings)
    }
}

async fn build_target(path: &Path) -> Result<AnalysisTarget> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || AnalysisTarget::from_path(owned))
        .await
        .map_err(|e| TriageError::TargetUnreadable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
}

/// Root of one run's private scratch area.
///
/// Removed on drop, so canceled and failed runs leave nothing behind. A root
/// under a configured artifacts directory is kept once the run completes.
struct Scratch {
    dir: TempDir,
    keep: bool,
}

impl Scratch {
    fn create(artifacts_dir: Option<&Path>, target: &AnalysisTarget) -> Result<Self> {
        let Some(base) = artifacts_dir else {
            let dir = tempfile::Builder::new()
                .prefix("stegotriage-")
                .tempdir()
                .map_err(TriageError::Scratch)?;
            return Ok(Self { dir, keep: false });
        };

        let base = std::path::absolute(base).map_err(TriageError::Scratch)?;
        std::fs::create_dir_all(&base).map_err(TriageError::Scratch)?;
        let prefix = format!(
            "{}-{}-",
            target.sha256.get(..12).unwrap_or(&target.sha256),
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        );
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .rand_bytes(4)
            .tempdir_in(&base)
            .map_err(TriageError::Scratch)?;
        Ok(Self { dir, keep: true })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// End of a completed run: the kept directory, if any.
    fn finish(self) -> Option<PathBuf> {
        if self.keep {
            Some(self.dir.keep())
        } else {
            None
        }
    }
}
