use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memlobe::coordinator::Coordinator;
use memlobe::crash::{self, CrashContext, CrashType};
use memlobe::store::Detail;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static CRASH_CONTEXT: Mutex<Option<CrashContext>> = Mutex::new(None);

fn uptime_secs() -> u64 {
    PROCESS_START.get().map(|s| s.elapsed().as_secs()).unwrap_or(0)
}

fn snapshot_context() -> CrashContext {
    CRASH_CONTEXT
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .unwrap_or_default()
}

/// Journal an uncaught panic, mirroring the behavior `write_crash_report`
/// already gives a caught transport error (4.C). The default hook still
/// prints to stderr first, so a panic's process-exit code and diagnostics
/// are unaffected by this.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let error = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        let stack = format!("{info}\n{}", std::backtrace::Backtrace::capture());
        let report = crash::build_crash_report(
            error,
            CrashType::UncaughtException,
            snapshot_context(),
            Some(stack),
            uptime_secs(),
            chrono::Utc::now(),
        );
        let _ = crash::write_crash_report_sync(&report);
    }));
}

/// SIGINT/SIGTERM trigger a graceful exit, not a crash report (§5): no
/// journal entry, just an orderly process exit. Runs its own
/// current-thread runtime since `main` itself stays synchronous.
#[cfg(unix)]
fn spawn_signal_watcher() {
    std::thread::spawn(|| {
        let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
            return;
        };
        rt.block_on(async {
            let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
                return;
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            tracing::info!("received shutdown signal, exiting gracefully");
            std::process::exit(0);
        });
    });
}

#[cfg(not(unix))]
fn spawn_signal_watcher() {
    std::thread::spawn(|| {
        let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
            return;
        };
        rt.block_on(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal, exiting gracefully");
            std::process::exit(0);
        });
    });
}

#[derive(Debug, Parser)]
#[command(name = "memlobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Persistent per-repository knowledge store for AI coding agents")]
struct Cli {
    /// Path to memory-config.json (defaults to ./memory-config.json, then env, then a single default lobe)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the MCP stdio server
    Serve,
    /// Print per-lobe storage stats as JSON
    Stats {
        #[arg(long)]
        lobe: Option<String>,
    },
    /// Run a one-shot query against a lobe
    Query {
        #[arg(long)]
        lobe: Option<String>,
        #[arg(long, default_value = "*")]
        scope: String,
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    PROCESS_START.set(Instant::now()).ok();
    install_panic_hook();
    spawn_signal_watcher();

    let cli = Cli::parse();
    let coordinator = Coordinator::bootstrap_new(cli.config.as_deref());
    let cmd = cli.cmd.unwrap_or(Command::Serve);
    let is_serve = matches!(cmd, Command::Serve);

    *CRASH_CONTEXT.lock().unwrap_or_else(|e| e.into_inner()) = Some(CrashContext {
        phase: if is_serve { "serve".into() } else { "cli".into() },
        last_tool_call: None,
        active_lobe: None,
        config_source: coordinator.config_origin_label().to_string(),
        lobe_count: coordinator.lobe_names().len(),
    });

    let result = match cmd {
        Command::Serve => memlobe::transport::run_mcp(&coordinator),
        Command::Stats { lobe } => {
            let stats = coordinator.stats(lobe.as_deref()).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&stats_as_json(&stats))?);
            Ok(())
        }
        Command::Query { lobe, scope, filter } => {
            let (result, labels) = coordinator
                .query(lobe.as_deref(), &scope, Detail::Standard, filter.as_deref(), None)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("lobes: {}", labels.join(", "));
            println!("{}", memlobe::format::merged_body(&result.entries));
            Ok(())
        }
    };

    if is_serve {
        if let Err(e) = &result {
            let report = crash::build_crash_report(
                e.to_string(),
                CrashType::TransportError,
                snapshot_context(),
                None,
                uptime_secs(),
                chrono::Utc::now(),
            );
            let _ = crash::write_crash_report_sync(&report);
        }
    }

    result.context("memlobe command failed")
}

fn stats_as_json(
    stats: &std::collections::HashMap<String, memlobe::store::StatsResult>,
) -> serde_json::Value {
    serde_json::Value::Object(
        stats
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "totalEntries": s.total_entries,
                        "byTopic": s.by_topic,
                        "byTrust": s.by_trust,
                        "freshnessFresh": s.by_freshness.fresh,
                        "freshnessStale": s.by_freshness.stale,
                        "storageSize": s.storage_size,
                        "storageBudgetBytes": s.storage_budget_bytes,
                        "memoryPath": s.memory_path.display().to_string(),
                        "corruptFiles": s.corrupt_files,
                    }),
                )
            })
            .collect(),
    )
}
