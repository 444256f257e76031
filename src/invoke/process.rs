//! Subprocess-backed tool invoker.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::artifacts::collect_artifacts;
use super::capture::{read_bounded, Captured};
use super::template::{self, TemplateVars};
use super::{ExitState, InvokeOptions, ToolInvocation, ToolInvoker};
use crate::target::AnalysisTarget;
use crate::tools::{Availability, ToolDescriptor};

/// Default timeout for availability probes.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Runs tools as child processes located on a search path.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    search_path: Vec<PathBuf>,
    use_system_path: bool,
    probe_timeout: Duration,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInvoker {
    /// Create an invoker that searches the system `PATH`.
    pub fn new() -> Self {
        Self {
            search_path: Vec::new(),
            use_system_path: true,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }

    /// Directories searched before `PATH`.
    pub fn search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// Whether `PATH` is searched after the configured directories.
    pub fn use_system_path(mut self, enabled: bool) -> Self {
        self.use_system_path = enabled;
        self
    }

    pub fn probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Locate `program` on the search path.
    ///
    /// Names containing a path separator are checked as given. The result is
    /// absolute, since extracting tools run inside their scratch directory.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.is_absolute() || candidate.components().count() > 1 {
            return is_executable(candidate).then(|| absolute(candidate));
        }

        let system: Vec<PathBuf> = if self.use_system_path {
            std::env::var_os("PATH")
                .map(|p| std::env::split_paths(&p).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        self.search_path
            .iter()
            .chain(system.iter())
            .flat_map(|dir| executable_names(program).into_iter().map(move |n| dir.join(n)))
            .find(|p| is_executable(p))
            .map(|p| absolute(&p))
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn probe(&self, descriptor: &ToolDescriptor) -> Availability {
        let Some(path) = self.resolve(descriptor.program()) else {
            return Availability::Missing;
        };

        if descriptor.probe_args.is_empty() {
            return Availability::Available { path };
        }

        let mut last_failure = String::new();
        for args in &descriptor.probe_args {
            let mut cmd = Command::new(&path);
            cmd.args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            match timeout(self.probe_timeout, cmd.status()).await {
                Ok(Ok(status)) => match status.code() {
                    Some(code) if descriptor.probe_exit_codes.contains(&code) => {
                        debug!(tool = %descriptor.name, path = %path.display(), "tool available");
                        return Availability::Available { path };
                    }
                    Some(code) => {
                        last_failure = format!("probe {:?} exited with status {}", args, code)
                    }
                    None => last_failure = format!("probe {:?} was terminated by a signal", args),
                },
                Ok(Err(e)) => last_failure = format!("probe {:?} failed to start: {}", args, e),
                Err(_) => {
                    last_failure = format!(
                        "probe {:?} timed out after {}s",
                        args,
                        self.probe_timeout.as_secs_f64()
                    )
                }
            }
        }

        debug!(tool = %descriptor.name, reason = %last_failure, "tool probe failed");
        Availability::ProbeFailed(last_failure)
    }

    async fn run(
        &self,
        descriptor: &ToolDescriptor,
        target: &AnalysisTarget,
        options: &InvokeOptions,
    ) -> ToolInvocation {
        let mut invocation = ToolInvocation::begin(&descriptor.name);

        let Some(program) = self.resolve(descriptor.program()) else {
            return invocation.finish(ExitState::SpawnFailed(format!(
                "{} not found on search path",
                descriptor.program()
            )));
        };

        let vars = TemplateVars {
            target: &target.path,
            scratch: &options.scratch_dir,
            password: options.password.as_deref(),
        };
        let args: Vec<OsString> = match template::render(&descriptor.args, &vars) {
            Ok(a) => a,
            Err(e) => return invocation.finish(ExitState::SpawnFailed(e.to_string())),
        };

        if descriptor.extracts_files() {
            if let Err(e) = std::fs::create_dir_all(&options.scratch_dir) {
                return invocation.finish(ExitState::SpawnFailed(format!(
                    "cannot create scratch directory {}: {}",
                    options.scratch_dir.display(),
                    e
                )));
            }
        }

        debug!(
            tool = %descriptor.name,
            program = %program.display(),
            args = ?args,
            timeout_s = options.timeout.as_secs_f64(),
            "spawning tool"
        );

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if descriptor.extracts_files() {
            cmd.current_dir(&options.scratch_dir);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return invocation.finish(ExitState::SpawnFailed(e.to_string())),
        };
        // dropped with the run future, so cancellation reaches forked helpers too
        let mut group = ProcessGroup::of(&child);

        let cap = options.max_output_bytes;
        let stdout = tokio::spawn(read_bounded(child.stdout.take(), cap));
        let stderr = tokio::spawn(read_bounded(child.stderr.take(), cap));

        let exit = match timeout(options.timeout, child.wait()).await {
            Ok(Ok(status)) => match status.code() {
                Some(code) => ExitState::Exited(code),
                None => ExitState::Signaled,
            },
            Ok(Err(e)) => ExitState::SpawnFailed(format!("waiting for process: {}", e)),
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(tool = %descriptor.name, error = %e, "failed to kill timed-out tool");
                }
                ExitState::TimedOut
            }
        };

        // background helpers left behind would keep the pipes open
        group.kill();

        let out = join_capture(stdout).await;
        let err = join_capture(stderr).await;
        for e in out.error.iter().chain(err.error.iter()) {
            warn!(tool = %descriptor.name, error = %e, "error reading tool output");
        }
        invocation.truncated = out.truncated || err.truncated;
        invocation.stdout = out.bytes;
        invocation.stderr = err.bytes;

        if descriptor.extracts_files() && exit != ExitState::TimedOut {
            let root = options.scratch_root.clone();
            let dir = options.scratch_dir.clone();
            match tokio::task::spawn_blocking(move || collect_artifacts(&root, &dir)).await {
                Ok(artifacts) => invocation.artifacts = artifacts,
                Err(e) => warn!(tool = %descriptor.name, error = %e, "artifact scan failed"),
            }
        }

        let invocation = invocation.finish(exit);
        debug!(
            tool = %invocation.tool,
            exit = ?invocation.exit,
            stdout_bytes = invocation.stdout.len(),
            stderr_bytes = invocation.stderr.len(),
            truncated = invocation.truncated,
            artifacts = invocation.artifacts.len(),
            elapsed_ms = invocation.elapsed().as_millis() as u64,
            "tool finished"
        );
        invocation
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// How long output pipes may stay open after the tool itself is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

async fn join_capture(mut handle: JoinHandle<Captured>) -> Captured {
    match timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => Captured {
            error: Some(format!("output reader failed: {}", e)),
            ..Captured::default()
        },
        Err(_) => {
            handle.abort();
            Captured {
                error: Some("output still open after the tool exited".to_string()),
                ..Captured::default()
            }
        }
    }
}

/// The process group a tool was started in.
///
/// The whole group is killed when the tool finishes, times out or the run is
/// dropped, so processes the tool forked never outlive it.
struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { id: child.id() }
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        if let Some(id) = self.id.take() {
            // SAFETY: killpg only sends a signal; `id` is the group created by process_group(0)
            unsafe {
                libc::killpg(id as libc::pid_t, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.id = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(windows)]
fn executable_names(program: &str) -> Vec<String> {
    if Path::new(program).extension().is_some() {
        return vec![program.to_string()];
    }
    ["exe", "bat", "cmd"]
        .iter()
        .map(|ext| format!("{}.{}", program, ext))
        .chain(std::iter::once(program.to_string()))
        .collect()
}

#[cfg(not(windows))]
fn executable_names(program: &str) -> Vec<String> {
    vec![program.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
