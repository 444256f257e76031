//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stegotriage::{
    AnalysisTarget, Availability, ExitState, InvokeOptions, ToolDescriptor, ToolInvocation,
    ToolInvoker,
};

/// PNG signature followed by an IHDR chunk header; enough for sniffing.
pub const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x02\x00\x00\x00";

/// Write a small PNG-looking file named `name` into `dir`.
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = PNG_HEADER.to_vec();
    bytes.extend_from_slice(b"IEND\xaeB`\x82");
    std::fs::write(&path, bytes).expect("should write sample png");
    path
}

/// What a scripted tool does when run.
#[derive(Debug, Clone)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub exit: ExitState,
    pub delay: Option<Duration>,
}

impl Script {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit: ExitState::Exited(0),
            delay: None,
        }
    }

    pub fn exit(mut self, exit: ExitState) -> Self {
        self.exit = exit;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Invoker answering from a table instead of running processes.
///
/// Tools without a script probe as missing.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Script>,
    pub probes: AtomicUsize,
    pub runs: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(mut self, name: &str, script: Script) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn probe(&self, descriptor: &ToolDescriptor) -> Availability {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.scripts.contains_key(&descriptor.name) {
            Availability::Available {
                path: PathBuf::from("/usr/bin").join(&descriptor.name),
            }
        } else {
            Availability::Missing
        }
    }

    async fn run(
        &self,
        descriptor: &ToolDescriptor,
        _target: &AnalysisTarget,
        _options: &InvokeOptions,
    ) -> ToolInvocation {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let invocation = ToolInvocation::begin(&descriptor.name);
        let Some(script) = self.scripts.get(&descriptor.name) else {
            return invocation.finish(ExitState::SpawnFailed("no script".to_string()));
        };
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        invocation
            .with_output(script.stdout.clone(), script.stderr.clone())
            .finish(script.exit.clone())
    }
}

/// exiftool JSON for a file carrying a GPS position.
pub const EXIFTOOL_GPS: &str = r#"[{
  "SourceFile": "sample.png",
  "FileType": "PNG",
  "ImageWidth": 1,
  "GPSLatitude": "52 deg 31' 12.00\" N"
}]"#;
