//! Crash Journal (component C).
//!
//! Write-on-crash, read-on-next-start. Writes are atomic per file; the
//! `LATEST.json` pointer is updated last so readers never observe a torn
//! state (§4.C).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrashType {
    StartupFailure,
    LobeInitFailure,
    TransportError,
    UncaughtException,
    UnhandledRejection,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrashContext {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tool_call: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_lobe: Option<String>,
    pub config_source: String,
    pub lobe_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashReport {
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "type")]
    pub kind: CrashType,
    pub context: CrashContext,
    pub recovery_steps: Vec<String>,
    pub server_uptime_secs: u64,
}

pub fn crash_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memory-mcp")
        .join("crashes")
}

fn latest_pointer_path() -> PathBuf {
    crash_dir().join("LATEST.json")
}

fn derive_recovery_steps(kind: CrashType, error: &str, context: &CrashContext) -> Vec<String> {
    let mut steps = Vec::new();
    let lower = error.to_lowercase();

    if lower.contains("enospc") {
        steps.push("Disk is full — free space under the memory store's root before retrying.".to_string());
    }
    if lower.contains("eacces") {
        steps.push("Permission denied — check file ownership/mode on the memory directory.".to_string());
    }
    if lower.contains("enoent") && kind == CrashType::StartupFailure {
        steps.push("Config path not found — verify `memory-config.json` exists at the expected location.".to_string());
    }
    if kind == CrashType::LobeInitFailure {
        let lobe = context.active_lobe.clone().unwrap_or_else(|| "<unknown>".to_string());
        steps.push(format!("Lobe '{lobe}' failed to initialize — inspect its memory directory for permission or corruption issues."));
    }
    if kind == CrashType::TransportError {
        steps.push("Transport error — toggle the host (disconnect/reconnect the MCP client) to retry.".to_string());
    }

    if steps.is_empty() {
        steps.push("Restart the process; if the problem recurs, inspect the crash report for details.".to_string());
    }

    steps
}

pub fn build_crash_report(
    error: impl Into<String>,
    kind: CrashType,
    context: CrashContext,
    stack: Option<String>,
    server_uptime_secs: u64,
    now: DateTime<Utc>,
) -> CrashReport {
    let error = error.into();
    let recovery_steps = derive_recovery_steps(kind, &error, &context);
    CrashReport {
        timestamp: now,
        pid: std::process::id(),
        error,
        stack,
        kind,
        context,
        recovery_steps,
        server_uptime_secs,
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}

fn report_filename(report: &CrashReport) -> String {
    format!("crash-{}.json", report.timestamp.timestamp_millis())
}

/// Write the report, then update `LATEST.json` last (atomic, torn-state-free).
pub fn write_crash_report_sync(report: &CrashReport) -> std::io::Result<()> {
    let dir = crash_dir();
    let report_path = dir.join(report_filename(report));
    let bytes = serde_json::to_vec_pretty(report).expect("CrashReport always serializes");
    atomic_write(&report_path, &bytes)?;

    let pointer = serde_json::json!({ "path": report_path.file_name().unwrap().to_string_lossy() });
    atomic_write(&latest_pointer_path(), serde_json::to_vec_pretty(&pointer)?.as_slice())?;
    tracing::error!(kind = ?report.kind, error = %report.error, "crash journaled");
    Ok(())
}

/// Async wrapper kept for API parity with the spec's `writeCrashReport`; the
/// underlying I/O is the same synchronous atomic write (no tokio fs needed
/// for journal-sized payloads).
pub async fn write_crash_report(report: CrashReport) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_crash_report_sync(&report))
        .await
        .expect("crash-journal write task must not panic")
}

/// Returns `None` when no pointer exists; never errors on a missing directory.
pub fn read_latest_crash() -> Option<CrashReport> {
    let pointer_path = latest_pointer_path();
    let pointer_bytes = std::fs::read(&pointer_path).ok()?;
    let pointer: serde_json::Value = serde_json::from_slice(&pointer_bytes).ok()?;
    let filename = pointer.get("path")?.as_str()?;
    let report_bytes = std::fs::read(crash_dir().join(filename)).ok()?;
    serde_json::from_slice(&report_bytes).ok()
}

/// Reverse-chronological history, newest first, up to `n` reports.
pub fn read_crash_history(n: usize) -> Vec<CrashReport> {
    let dir = crash_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut reports: Vec<CrashReport> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with("crash-") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .filter_map(|e| std::fs::read(e.path()).ok())
        .filter_map(|bytes| serde_json::from_slice::<CrashReport>(&bytes).ok())
        .collect();

    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    reports.truncate(n);
    reports
}

pub fn clear_latest_crash() -> std::io::Result<()> {
    let path = latest_pointer_path();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

pub fn format_summary(report: &CrashReport) -> String {
    format!(
        "[{}] {:?} at {} (phase: {}) — {}",
        report.timestamp.to_rfc3339(),
        report.kind,
        report.context.active_lobe.as_deref().unwrap_or("n/a"),
        report.context.phase,
        report.error
    )
}

pub fn format_full(report: &CrashReport) -> String {
    let mut out = format_summary(report);
    out.push_str(&format!("\npid: {}\n", report.pid));
    out.push_str(&format!("uptime: {}s\n", report.server_uptime_secs));
    if let Some(stack) = &report.stack {
        out.push_str(&format!("stack:\n{stack}\n"));
    }
    out.push_str("recovery steps:\n");
    for step in &report.recovery_steps {
        out.push_str(&format!("  - {step}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Crash-journal tests mutate a single process-global directory
    // (`~/.memory-mcp/crashes`), so they must not interleave.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn isolate() -> std::sync::MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn read_latest_returns_none_without_pointer() {
        let _g = isolate();
        let _ = clear_latest_crash();
        assert!(read_latest_crash().is_none());
    }

    #[test]
    fn write_then_read_latest_round_trips() {
        let _g = isolate();
        let report = build_crash_report(
            "ENOSPC: no space left on device",
            CrashType::StartupFailure,
            CrashContext {
                phase: "init".into(),
                last_tool_call: None,
                active_lobe: None,
                config_source: "file".into(),
                lobe_count: 1,
            },
            None,
            0,
            Utc::now(),
        );
        write_crash_report_sync(&report).unwrap();

        let latest = read_latest_crash().expect("must read back latest");
        assert_eq!(latest.error, report.error);
        assert!(latest.recovery_steps.iter().any(|s| s.contains("Disk is full")));

        let _ = clear_latest_crash();
    }

    #[test]
    fn recovery_steps_mention_failing_lobe() {
        let report = build_crash_report(
            "failed to read directory",
            CrashType::LobeInitFailure,
            CrashContext {
                phase: "lobe-init".into(),
                last_tool_call: None,
                active_lobe: Some("backend".into()),
                config_source: "file".into(),
                lobe_count: 2,
            },
            None,
            5,
            Utc::now(),
        );
        assert!(report.recovery_steps.iter().any(|s| s.contains("backend")));
    }

    #[test]
    fn history_is_reverse_chronological() {
        let _g = isolate();
        let dir = crash_dir();
        let _ = std::fs::remove_dir_all(&dir);

        for (i, secs) in [10_i64, 20, 30].into_iter().enumerate() {
            let ts = Utc::now() - chrono::Duration::seconds(100 - secs);
            let report = build_crash_report(
                format!("error {i}"),
                CrashType::Unknown,
                CrashContext::default(),
                None,
                0,
                ts,
            );
            write_crash_report_sync(&report).unwrap();
        }

        let history = read_crash_history(10);
        assert!(history.len() >= 3);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
