//! Integration tests running real child processes.
//!
//! Small shell scripts stand in for the analyzers so the process plumbing
//! (resolution, probing, timeouts, cancellation, artifact collection) is
//! exercised without any forensics tool installed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stegotriage::tools::{ArtifactRule, Capability, PatternRule};
use stegotriage::{
    AnalyzeOptions, Category, Confidence, Orchestrator, OutputFormat, ProcessInvoker, Settings,
    ToolDescriptor, ToolRegistry, ToolStatus, TriageError, Verdict,
};

/// Answers probes, then runs `body`.
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo \"{} 1.0\"; exit 0; fi\n{}\n",
        name, body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_target(dir: &Path) -> PathBuf {
    let path = dir.join("notes.txt");
    std::fs::write(&path, "nothing to see here\n").unwrap();
    path
}

fn orchestrator(bin: &Path, tools: Vec<ToolDescriptor>) -> Orchestrator {
    let invoker = ProcessInvoker::new()
        .search_path(vec![bin.to_path_buf()])
        .use_system_path(false);
    Orchestrator::new(ToolRegistry::new(tools), Arc::new(invoker))
}

#[tokio::test]
async fn test_vocabulary_match_from_real_process() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    write_script(
        temp.path(),
        "seeker",
        "echo \"[i] Found passphrase: \\\"hunter2\\\"\"\necho \"[i] Original filename: \\\"flag.txt\\\"\"",
    );

    let mut seeker = ToolDescriptor::new("seeker", &["{target}"], OutputFormat::Lines);
    seeker.patterns = vec![PatternRule {
        regex: "Found passphrase".to_string(),
        category: Category::HiddenPayload,
        confidence: Confidence::High,
        description: Some("passphrase recovered: {line}".to_string()),
    }];

    let report = orchestrator(temp.path(), vec![seeker])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.tool_status["seeker"], ToolStatus::RanOk);
    assert_eq!(report.verdict, Verdict::Positive);
    assert!(report.findings[0].description.starts_with("passphrase recovered:"));
}

#[tokio::test]
async fn test_extracted_files_become_findings() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    write_script(
        temp.path(),
        "carver",
        "mkdir -p \"$2\" && printf 'secret' > \"$2/payload.bin\" && : > \"$2/empty.bin\"",
    );

    let mut carver = ToolDescriptor::new("carver", &["{target}", "{scratch}"], OutputFormat::Lines);
    carver.capabilities = vec![Capability::ExtractsFiles];
    carver.artifacts = Some(ArtifactRule {
        category: Category::CarvedFile,
        confidence: Confidence::Medium,
        ignore: Vec::new(),
    });

    let report = orchestrator(temp.path(), vec![carver])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();

    // empty files are not artifacts
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.category, Category::CarvedFile);
    let artifact = finding.artifact.as_ref().expect("finding should carry its artifact");
    assert_eq!(artifact.size, 6);
    assert!(artifact.path.ends_with("payload.bin"));
    assert_eq!(report.verdict, Verdict::Suspicious);
}

#[tokio::test]
async fn test_missing_binary_is_unavailable() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());

    let ghost = ToolDescriptor::new("ghost", &["{target}"], OutputFormat::Lines);
    let report = orchestrator(temp.path(), vec![ghost])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.tool_status["ghost"], ToolStatus::Unavailable);
    assert_eq!(report.verdict, Verdict::Suspicious);
}

#[tokio::test]
async fn test_timeout_is_enforced() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    write_script(temp.path(), "sleeper", "exec sleep 30");

    let mut sleeper = ToolDescriptor::new("sleeper", &["{target}"], OutputFormat::Lines);
    sleeper.timeout_secs = Some(1);

    let started = Instant::now();
    let report = orchestrator(temp.path(), vec![sleeper])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.tool_status["sleeper"], ToolStatus::TimedOut);
    assert_eq!(report.verdict, Verdict::Inconclusive);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_timeout_does_not_hold_up_other_tools() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    write_script(temp.path(), "sleeper", "exec sleep 30");
    write_script(temp.path(), "quick", "echo done");
    write_script(temp.path(), "brisk", "echo done");

    let mut sleeper = ToolDescriptor::new("sleeper", &["{target}"], OutputFormat::Lines);
    sleeper.timeout_secs = Some(1);
    let tools = vec![
        sleeper,
        ToolDescriptor::new("quick", &["{target}"], OutputFormat::Lines),
        ToolDescriptor::new("brisk", &["{target}"], OutputFormat::Lines),
    ];

    let invoker = ProcessInvoker::new()
        .search_path(vec![temp.path().to_path_buf()])
        .use_system_path(false);
    let settings = Settings {
        concurrency: 3,
        ..Settings::default()
    };
    let orch = Orchestrator::with_settings(ToolRegistry::new(tools), Arc::new(invoker), settings);

    let started = Instant::now();
    let report = orch.analyze(&target, AnalyzeOptions::default()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.tool_status["sleeper"], ToolStatus::TimedOut);
    assert_eq!(report.tool_status["quick"], ToolStatus::RanOk);
    assert_eq!(report.tool_status["brisk"], ToolStatus::RanOk);
    assert!(elapsed < Duration::from_millis(2500), "run took {:?}", elapsed);
}

#[cfg(target_os = "linux")]
fn process_gone(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/status", pid)) {
        Err(_) => true,
        Ok(status) => status
            .lines()
            .any(|l| l.starts_with("State:") && l.contains('Z')),
    }
}

/// Poll for up to a second until `pid` has exited.
#[cfg(target_os = "linux")]
async fn wait_gone(pid: &str) -> bool {
    for _ in 0..50 {
        if process_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Resolves shortly after `pid_file` has been written.
#[cfg(target_os = "linux")]
async fn written(pid_file: PathBuf) {
    loop {
        if std::fs::read_to_string(&pid_file)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[cfg(target_os = "linux")]
fn read_pid(pid_file: &Path) -> String {
    std::fs::read_to_string(pid_file).unwrap().trim().to_string()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancel_kills_child() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    let pid_file = temp.path().join("sleeper.pid");
    write_script(
        temp.path(),
        "sleeper",
        &format!("echo $$ > \"{}\"\nexec sleep 30", pid_file.display()),
    );

    let sleeper = ToolDescriptor::new("sleeper", &["{target}"], OutputFormat::Lines);
    let orch = orchestrator(temp.path(), vec![sleeper]);

    let started = Instant::now();
    let err = orch
        .analyze_until(&target, AnalyzeOptions::default(), written(pid_file.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Canceled));
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = read_pid(&pid_file);
    assert!(wait_gone(&pid).await, "child {} still running after cancel", pid);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancel_kills_forked_helpers() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    let pid_file = temp.path().join("helper.pid");
    write_script(
        temp.path(),
        "forker",
        &format!("sleep 30 &\necho $! > \"{}\"\nwait", pid_file.display()),
    );

    let forker = ToolDescriptor::new("forker", &["{target}"], OutputFormat::Lines);
    let orch = orchestrator(temp.path(), vec![forker]);

    let err = orch
        .analyze_until(&target, AnalyzeOptions::default(), written(pid_file.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Canceled));

    let pid = read_pid(&pid_file);
    assert!(wait_gone(&pid).await, "helper {} outlived the canceled run", pid);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_forked_helpers() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    let pid_file = temp.path().join("helper.pid");
    write_script(
        temp.path(),
        "forker",
        &format!("sleep 30 &\necho $! > \"{}\"\nwait", pid_file.display()),
    );

    let mut forker = ToolDescriptor::new("forker", &["{target}"], OutputFormat::Lines);
    forker.timeout_secs = Some(1);

    let started = Instant::now();
    let report = orchestrator(temp.path(), vec![forker])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();
    assert_eq!(report.tool_status["forker"], ToolStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(2500));

    let pid = read_pid(&pid_file);
    assert!(wait_gone(&pid).await, "helper {} outlived the timed-out tool", pid);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_background_helper_does_not_stall_finished_tool() {
    let temp = tempfile::TempDir::new().unwrap();
    let target = write_target(temp.path());
    let pid_file = temp.path().join("helper.pid");
    write_script(
        temp.path(),
        "leaver",
        &format!("sleep 30 &\necho $! > \"{}\"\necho done", pid_file.display()),
    );

    let mut leaver = ToolDescriptor::new("leaver", &["{target}"], OutputFormat::Lines);
    leaver.timeout_secs = Some(10);

    let started = Instant::now();
    let report = orchestrator(temp.path(), vec![leaver])
        .analyze(&target, AnalyzeOptions::default())
        .await
        .unwrap();
    assert_eq!(report.tool_status["leaver"], ToolStatus::RanOk);
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid = read_pid(&pid_file);
    assert!(wait_gone(&pid).await, "helper {} outlived its tool", pid);
}
