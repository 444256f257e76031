//! Tool registry with a per-instance availability cache.
//!
//! Availability is probed once per registry and cached; [`ToolRegistry::refresh`]
//! forgets the cache and probes again. Each registry owns its own cache, so
//! tests can pin availability with [`ToolRegistry::set_availability`] without
//! touching anything global.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::{builtin_tools, Capability, ToolDescriptor};
use crate::error::{Result, TriageError};
use crate::invoke::{template, ToolInvoker};
use crate::target::AnalysisTarget;

/// Probes run concurrently with at most this many in flight.
const PROBE_CONCURRENCY: usize = 8;

/// Result of probing a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// The binary was found and answered its probe.
    Available { path: PathBuf },
    /// No binary with that name on the search path.
    Missing,
    /// The binary exists but its probe failed.
    ProbeFailed(String),
    /// Turned off by configuration.
    Disabled,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }

    /// Short human-readable reason, used in logs and the `tools` listing.
    pub fn describe(&self) -> String {
        match self {
            Availability::Available { path } => format!("available at {}", path.display()),
            Availability::Missing => "not found".to_string(),
            Availability::ProbeFailed(reason) => reason.clone(),
            Availability::Disabled => "disabled by configuration".to_string(),
        }
    }
}

/// Which tools to run for a target, and why the others will not run.
#[derive(Debug, Clone, Default)]
pub struct ToolPlan {
    /// Applicable and available, in catalog order.
    pub runnable: Vec<ToolDescriptor>,
    /// Applicable but not available.
    pub unavailable: Vec<String>,
    /// Not applicable to this run, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl ToolPlan {
    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty() && self.unavailable.is_empty() && self.skipped.is_empty()
    }
}

/// Catalog of known analyzers plus their cached availability.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    availability: RwLock<HashMap<String, Availability>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(builtin_tools())
    }
}

impl ToolRegistry {
    /// Create a registry over `tools`. Later entries replace earlier ones with
    /// the same name, keeping the original position.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut merged: Vec<ToolDescriptor> = Vec::with_capacity(tools.len());
        for tool in tools {
            match merged.iter_mut().find(|t| t.name == tool.name) {
                Some(existing) => *existing = tool,
                None => merged.push(tool),
            }
        }
        Self {
            tools: merged,
            availability: RwLock::new(HashMap::new()),
        }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Look up a descriptor by name.
    pub fn describe(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TriageError::UnknownTool(name.to_string()))
    }

    /// Cached availability of a tool; `None` if it has not been probed yet.
    pub fn availability(&self, name: &str) -> Result<Option<Availability>> {
        self.describe(name)?;
        let cache = self.availability.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.get(name).cloned())
    }

    /// Path of an available tool, or `ToolUnavailable`.
    pub fn require_available(&self, name: &str) -> Result<PathBuf> {
        match self.availability(name)? {
            Some(Availability::Available { path }) => Ok(path),
            Some(other) => Err(TriageError::ToolUnavailable(format!(
                "{}: {}",
                name,
                other.describe()
            ))),
            None => Err(TriageError::ToolUnavailable(format!("{}: not probed", name))),
        }
    }

    /// Pin the availability of a tool, bypassing the probe.
    pub fn set_availability(&self, name: &str, availability: Availability) -> Result<()> {
        self.describe(name)?;
        let mut cache = self.availability.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(name.to_string(), availability);
        Ok(())
    }

    /// Mark tools as disabled. Unknown names are reported as errors.
    pub fn disable<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            self.set_availability(name.as_ref(), Availability::Disabled)?;
        }
        Ok(())
    }

    /// Probe every tool that has no cached availability yet.
    pub async fn ensure_probed(&self, invoker: &dyn ToolInvoker) {
        let pending: Vec<&ToolDescriptor> = {
            let cache = self.availability.read().unwrap_or_else(PoisonError::into_inner);
            self.tools
                .iter()
                .filter(|t| !cache.contains_key(&t.name))
                .collect()
        };

        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "probing tool availability");
        let results: Vec<(String, Availability)> = stream::iter(pending)
            .map(|tool| async move { (tool.name.clone(), invoker.probe(tool).await) })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;

        let mut cache = self.availability.write().unwrap_or_else(PoisonError::into_inner);
        for (name, availability) in results {
            if !availability.is_available() {
                info!(tool = %name, reason = %availability.describe(), "tool unavailable");
            }
            // A concurrent set_availability wins over the probe result.
            cache.entry(name).or_insert(availability);
        }
    }

    /// Forget cached availability (keeping disabled tools disabled) and probe again.
    pub async fn refresh(&self, invoker: &dyn ToolInvoker) {
        {
            let mut cache = self.availability.write().unwrap_or_else(PoisonError::into_inner);
            cache.retain(|_, a| *a == Availability::Disabled);
        }
        self.ensure_probed(invoker).await;
    }

    /// Applicable, available tools for `target`, in catalog order.
    pub fn list_applicable(&self, target: &AnalysisTarget) -> Vec<ToolDescriptor> {
        self.plan(target, &PlanOptions::default()).runnable
    }

    /// Partition the catalog into runnable, unavailable and skipped tools.
    ///
    /// Tools never probed count as unavailable.
    pub fn plan(&self, target: &AnalysisTarget, options: &PlanOptions) -> ToolPlan {
        let cache = self.availability.read().unwrap_or_else(PoisonError::into_inner);
        let mut plan = ToolPlan::default();

        for tool in &self.tools {
            if let Some(only) = &options.only {
                if !only.contains(&tool.name) {
                    plan.skipped
                        .push((tool.name.clone(), "not selected".to_string()));
                    continue;
                }
            }

            if !tool.applies_to(target.kind) {
                plan.skipped.push((
                    tool.name.clone(),
                    format!("does not handle {} files", target.kind),
                ));
                continue;
            }

            if tool.has_capability(Capability::RequiresPassword)
                && template::references(&tool.args, "password")
                && !options.has_password
            {
                plan.skipped
                    .push((tool.name.clone(), "requires a password".to_string()));
                continue;
            }

            match cache.get(&tool.name) {
                Some(a) if a.is_available() => plan.runnable.push(tool.clone()),
                Some(_) => plan.unavailable.push(tool.name.clone()),
                None => {
                    warn!(tool = %tool.name, "tool was never probed; treating as unavailable");
                    plan.unavailable.push(tool.name.clone());
                }
            }
        }

        plan
    }
}

/// Run-specific inputs to [`ToolRegistry::plan`].
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Restrict the run to these tools.
    pub only: Option<HashSet<String>>,
    pub has_password: bool,
}
