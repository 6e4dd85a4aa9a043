//! Configuration loading (§6): file origin, env-var origin, or defaults.
//! Hot-reload in the coordinator depends on knowing the origin precisely —
//! only a file origin is ever stat'd for mtime changes (§4.E).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobeConfig {
    pub root: PathBuf,
    #[serde(default = "default_budget_mb")]
    pub budget_mb: u64,
    #[serde(default)]
    pub memory_dir: Option<String>,
}

fn default_budget_mb() -> u64 {
    100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorOverrides {
    pub stale_days_standard: Option<i64>,
    pub stale_days_preferences: Option<i64>,
    pub max_stale_in_briefing: Option<usize>,
    pub max_dedup_suggestions: Option<usize>,
    pub max_conflict_pairs: Option<usize>,
}

impl BehaviorOverrides {
    pub fn apply(&self, base: crate::store::BehaviorConfig) -> crate::store::BehaviorConfig {
        crate::store::BehaviorConfig {
            stale_days_standard: self.stale_days_standard.unwrap_or(base.stale_days_standard),
            stale_days_preferences: self.stale_days_preferences.unwrap_or(base.stale_days_preferences),
            max_stale_in_briefing: self.max_stale_in_briefing.unwrap_or(base.max_stale_in_briefing),
            max_dedup_suggestions: self.max_dedup_suggestions.unwrap_or(base.max_dedup_suggestions),
            max_conflict_pairs: self.max_conflict_pairs.unwrap_or(base.max_conflict_pairs),
            ..base
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub lobes: HashMap<String, LobeConfig>,
    #[serde(default)]
    pub behavior: Option<BehaviorOverrides>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Env,
    Defaults,
}

impl ConfigOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOrigin::File(_) => "file",
            ConfigOrigin::Env => "env",
            ConfigOrigin::Defaults => "defaults",
        }
    }
}

pub const DEFAULT_MEMORY_DIR: &str = ".memlobe";
pub const DEFAULT_LOBE_NAME: &str = "default";

/// Load configuration, preferring an explicit file path, then the
/// `memory-config.json` in the current directory, then environment
/// variables, then a single default lobe at the user's home directory.
pub fn load(explicit_path: Option<&Path>) -> (MemoryConfig, ConfigOrigin) {
    if let Some(path) = explicit_path {
        if let Some(cfg) = read_file(path) {
            return (cfg, ConfigOrigin::File(path.to_path_buf()));
        }
    }

    let cwd_candidate = PathBuf::from("memory-config.json");
    if let Some(cfg) = read_file(&cwd_candidate) {
        return (cfg, ConfigOrigin::File(cwd_candidate));
    }

    if let Some(cfg) = from_env() {
        return (cfg, ConfigOrigin::Env);
    }

    (defaults(), ConfigOrigin::Defaults)
}

fn read_file(path: &Path) -> Option<MemoryConfig> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn from_env() -> Option<MemoryConfig> {
    if let Ok(workspaces) = std::env::var("MEMORY_MCP_WORKSPACES") {
        let mut lobes = HashMap::new();
        for entry in workspaces.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, root) = entry.split_once('=').unwrap_or((entry, entry));
            lobes.insert(
                name.to_string(),
                LobeConfig {
                    root: PathBuf::from(root),
                    budget_mb: default_budget_mb(),
                    memory_dir: std::env::var("MEMORY_MCP_DIR").ok(),
                },
            );
        }
        if !lobes.is_empty() {
            return Some(MemoryConfig { lobes, behavior: None });
        }
    }

    if let Ok(root) = std::env::var("MEMORY_MCP_REPO_ROOT") {
        let mut lobes = HashMap::new();
        lobes.insert(
            DEFAULT_LOBE_NAME.to_string(),
            LobeConfig {
                root: PathBuf::from(root),
                budget_mb: default_budget_mb(),
                memory_dir: std::env::var("MEMORY_MCP_DIR").ok(),
            },
        );
        return Some(MemoryConfig { lobes, behavior: None });
    }

    None
}

fn defaults() -> MemoryConfig {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let mut lobes = HashMap::new();
    lobes.insert(
        DEFAULT_LOBE_NAME.to_string(),
        LobeConfig {
            root: home,
            budget_mb: default_budget_mb(),
            memory_dir: None,
        },
    );
    MemoryConfig { lobes, behavior: None }
}

pub fn global_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memory-mcp")
        .join("global")
}

/// `None` when the file is missing — treated as "never checked" by callers.
pub fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_repo_root_produces_single_default_lobe() {
        // Exercise the parser directly rather than mutating process env,
        // since tests may run concurrently within the same process.
        let json = r#"{"lobes": {"default": {"root": "/tmp/repo", "budgetMB": 50}}}"#;
        let cfg: MemoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.lobes.len(), 1);
        assert_eq!(cfg.lobes["default"].budget_mb, 50);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let (cfg, origin) = load(Some(Path::new("/nonexistent/path/memory-config.json")));
        assert_eq!(origin, ConfigOrigin::Defaults);
        assert_eq!(cfg.lobes.len(), 1);
    }
}
