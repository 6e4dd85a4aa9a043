//! Multi-lobe Coordinator (component E): lobe map, global store, hot
//! reload, health tracking, cross-lobe fan-out, one-shot global migration.

use crate::analyzer;
use crate::config::{self, ConfigOrigin, LobeConfig, MemoryConfig};
use crate::entry::Topic;
use crate::store::{
    BootstrapSeed, BriefingResult, ContextHit, CorrectAction, CorrectResult, Detail, EntryStore, QueryResult,
    StatsResult, StoreConfig, StoreResult,
};
use crate::tfidf::TfidfModel;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

const CROSS_LOBE_WEAK_MATCH_PENALTY: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobeHealth {
    Healthy,
    Degraded { reason: String, recovery_steps: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Running,
    Degraded,
    SafeMode,
}

struct LobeSlot {
    root: PathBuf,
    memory_path: PathBuf,
    budget_bytes: u64,
    store: Mutex<Option<EntryStore>>,
    health: Mutex<LobeHealth>,
}

pub struct Coordinator {
    lobes: Mutex<HashMap<String, LobeSlot>>,
    global_store: Mutex<EntryStore>,
    config_origin: ConfigOrigin,
    config_snapshot: Mutex<MemoryConfig>,
    last_mtime: Mutex<Option<SystemTime>>,
    tfidf_model: TfidfModel,
}

fn derive_lobe_recovery_steps(reason: &str) -> Vec<String> {
    vec![format!(
        "Lobe initialization failed ({reason}) — inspect the lobe's memory directory for permission or corruption issues, then toggle the host to retry."
    )]
}

fn budget_bytes(mb: u64) -> u64 {
    mb * 1024 * 1024
}

impl Coordinator {
    pub fn bootstrap_new(explicit_config_path: Option<&std::path::Path>) -> Self {
        let (config, origin) = config::load(explicit_config_path);
        let coordinator = Self {
            lobes: Mutex::new(HashMap::new()),
            global_store: Mutex::new(Self::build_global_store()),
            config_origin: origin,
            config_snapshot: Mutex::new(config.clone()),
            last_mtime: Mutex::new(None),
            tfidf_model: TfidfModel::seed_v2(),
        };
        coordinator.init_from_config(&config);
        coordinator
    }

    fn build_global_store() -> EntryStore {
        let global_dir = config::global_dir();
        let mut store = EntryStore::new(StoreConfig::new(&global_dir, &global_dir, u64::MAX));
        if let Err(e) = store.init() {
            tracing::error!(error = %e, "global store init failed");
        }
        store
    }

    fn init_from_config(&self, config: &MemoryConfig) {
        let mut lobes = self.lobes.lock().unwrap();
        for (name, lobe_cfg) in &config.lobes {
            lobes.insert(name.clone(), self.build_lobe_slot(lobe_cfg));
        }
        drop(lobes);
        self.run_global_topic_migration();
    }

    fn build_lobe_slot(&self, lobe_cfg: &LobeConfig) -> LobeSlot {
        let memory_dir = lobe_cfg
            .memory_dir
            .clone()
            .unwrap_or_else(|| config::DEFAULT_MEMORY_DIR.to_string());
        let memory_path = lobe_cfg.root.join(memory_dir);
        let budget = budget_bytes(lobe_cfg.budget_mb);

        let mut store_config = StoreConfig::new(&lobe_cfg.root, &memory_path, budget);
        if let Some(overrides) = &self.config_snapshot.lock().unwrap().behavior {
            store_config = store_config.with_behavior(overrides.apply(crate::store::BehaviorConfig::default()));
        }
        let mut store = EntryStore::new(store_config);
        let health = match store.init() {
            Ok(()) => LobeHealth::Healthy,
            Err(e) => {
                tracing::warn!(error = %e, path = %memory_path.display(), "lobe init failed, marking degraded");
                LobeHealth::Degraded {
                    reason: e.to_string(),
                    recovery_steps: derive_lobe_recovery_steps(&e.to_string()),
                }
            }
        };

        LobeSlot {
            root: lobe_cfg.root.clone(),
            memory_path,
            budget_bytes: budget,
            store: Mutex::new(Some(store)),
            health: Mutex::new(health),
        }
    }

    /// Moves `user`/`preferences` entries from every lobe into the global
    /// store, once, guarded by a `.migrated` marker in the global directory.
    fn run_global_topic_migration(&self) {
        let marker = config::global_dir().join(".migrated");
        if marker.exists() {
            return;
        }

        let lobes = self.lobes.lock().unwrap();
        let mut global = self.global_store.lock().unwrap();
        for slot in lobes.values() {
            let mut guard = slot.store.lock().unwrap();
            let Some(store) = guard.as_mut() else { continue };
            let to_migrate: Vec<_> = store
                .all_entries()
                .filter(|e| e.topic.is_global())
                .cloned()
                .collect();
            for entry in to_migrate {
                global.store(
                    entry.topic.clone(),
                    &entry.title,
                    &entry.content,
                    entry.sources.clone(),
                    entry.references.clone(),
                    Some(entry.trust),
                    entry.tags.clone(),
                    None,
                    entry.git_sha.clone(),
                    &self.tfidf_model,
                );
                store.correct(&entry.id, "", CorrectAction::Delete);
            }
        }
        drop(lobes);
        drop(global);

        if let Some(parent) = marker.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&marker, b"{}");
    }

    // ── hot reload ──────────────────────────────────────────────────────

    /// Re-reads the config file if its mtime advanced. A no-op for
    /// non-file origins (env/defaults are never stat'd, per §4.E).
    pub fn maybe_hot_reload(&self) {
        let ConfigOrigin::File(path) = &self.config_origin else {
            return;
        };

        let Some(mtime) = config::file_mtime(path) else {
            // Stat errors are swallowed — keep the current config.
            return;
        };

        let mut last = self.last_mtime.lock().unwrap();
        if *last == Some(mtime) {
            return;
        }
        *last = Some(mtime);
        drop(last);

        let (new_config, _origin) = config::load(Some(path));
        self.reconcile(new_config);
    }

    fn reconcile(&self, new_config: MemoryConfig) {
        let mut lobes = self.lobes.lock().unwrap();

        lobes.retain(|name, _| new_config.lobes.contains_key(name));

        for (name, lobe_cfg) in &new_config.lobes {
            let needs_rebuild = match lobes.get(name) {
                None => true,
                Some(existing) => existing.root != lobe_cfg.root || existing.memory_path != lobe_cfg_path(lobe_cfg),
            };
            if needs_rebuild {
                lobes.insert(name.clone(), self.build_lobe_slot(lobe_cfg));
            }
        }
        drop(lobes);

        *self.config_snapshot.lock().unwrap() = new_config;
        tracing::info!("configuration hot-reloaded");
    }

    // ── health / mode ──────────────────────────────────────────────────

    pub fn server_mode(&self) -> ServerMode {
        let lobes = self.lobes.lock().unwrap();
        if lobes.is_empty() {
            return ServerMode::SafeMode;
        }
        let healthy = lobes
            .values()
            .filter(|l| matches!(*l.health.lock().unwrap(), LobeHealth::Healthy))
            .count();
        if healthy == lobes.len() {
            ServerMode::Running
        } else if healthy == 0 {
            ServerMode::SafeMode
        } else {
            ServerMode::Degraded
        }
    }

    pub fn lobe_names(&self) -> Vec<String> {
        self.lobes.lock().unwrap().keys().cloned().collect()
    }

    // ── operations ──────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        lobe: Option<&str>,
        topic: Topic,
        title: &str,
        content: &str,
        sources: Vec<String>,
        references: Vec<String>,
        trust: Option<crate::entry::Trust>,
        tags: std::collections::BTreeSet<String>,
        branch: Option<String>,
        git_sha: Option<String>,
    ) -> Result<StoreResult, LobeError> {
        self.maybe_hot_reload();

        if topic.is_global() {
            let mut global = self.global_store.lock().unwrap();
            return Ok(global.store(
                topic,
                title,
                content,
                sources,
                references,
                trust,
                tags,
                branch,
                git_sha,
                &self.tfidf_model,
            ));
        }

        let lobe_name = self.resolve_write_lobe(lobe)?;
        let lobes = self.lobes.lock().unwrap();
        let slot = lobes.get(&lobe_name).ok_or(LobeError::Unknown(lobe_name.clone()))?;
        self.ensure_healthy(slot, &lobe_name)?;
        let mut guard = slot.store.lock().unwrap();
        let store = guard.as_mut().ok_or(LobeError::Unknown(lobe_name.clone()))?;
        Ok(store.store(
            topic,
            title,
            content,
            sources,
            references,
            trust,
            tags,
            branch,
            git_sha,
            &self.tfidf_model,
        ))
    }

    pub fn query(
        &self,
        lobe: Option<&str>,
        scope: &str,
        detail: Detail,
        filter: Option<&str>,
        branch: Option<&str>,
    ) -> Result<(QueryResult, Vec<String>), LobeError> {
        self.maybe_hot_reload();

        if scope == "user" || scope == "preferences" {
            let global = self.global_store.lock().unwrap();
            let result = global.query(scope, detail, filter, branch);
            return Ok((result, vec!["global".to_string()]));
        }

        match lobe {
            Some(name) => {
                let lobes = self.lobes.lock().unwrap();
                let slot = lobes.get(name).ok_or(LobeError::Unknown(name.to_string()))?;
                self.ensure_healthy(slot, name)?;
                let guard = slot.store.lock().unwrap();
                let store = guard.as_ref().ok_or(LobeError::Unknown(name.to_string()))?;
                Ok((store.query(scope, detail, filter, branch), vec![name.to_string()]))
            }
            None => {
                let lobes = self.lobes.lock().unwrap();
                if lobes.len() == 1 {
                    let (name, slot) = lobes.iter().next().unwrap();
                    self.ensure_healthy(slot, name)?;
                    let guard = slot.store.lock().unwrap();
                    let store = guard.as_ref().ok_or(LobeError::Unknown(name.clone()))?;
                    return Ok((store.query(scope, detail, filter, branch), vec![name.clone()]));
                }
                self.fan_out_query(&lobes, scope, detail, filter, branch)
            }
        }
    }

    fn fan_out_query(
        &self,
        lobes: &HashMap<String, LobeSlot>,
        scope: &str,
        detail: Detail,
        filter: Option<&str>,
        branch: Option<&str>,
    ) -> Result<(QueryResult, Vec<String>), LobeError> {
        let mut merged = QueryResult::default();
        let mut seen = std::collections::HashSet::new();
        let mut labels = Vec::new();

        for (name, slot) in lobes {
            if !matches!(*slot.health.lock().unwrap(), LobeHealth::Healthy) {
                continue;
            }
            let guard = slot.store.lock().unwrap();
            let Some(store) = guard.as_ref() else { continue };
            let result = store.query(scope, detail, filter, branch);
            labels.push(name.clone());
            for e in result.entries {
                if seen.insert(e.id.clone()) {
                    merged.entries.push(e);
                }
            }
            merged.conflicts.extend(result.conflicts);
        }

        merged.entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.last_accessed.cmp(&a.last_accessed))
        });

        Ok((merged, labels))
    }

    pub fn correct(&self, lobe: Option<&str>, id: &str, correction: &str, action: CorrectAction) -> Result<CorrectResult, LobeError> {
        self.maybe_hot_reload();

        if let Some(result) = self.try_correct_in(&self.global_store, id, correction, action) {
            return Ok(result);
        }

        match lobe {
            Some(name) => {
                let lobes = self.lobes.lock().unwrap();
                let slot = lobes.get(name).ok_or(LobeError::Unknown(name.to_string()))?;
                self.ensure_healthy(slot, name)?;
                let mut guard = slot.store.lock().unwrap();
                let store = guard.as_mut().ok_or(LobeError::Unknown(name.to_string()))?;
                Ok(store.correct(id, correction, action))
            }
            None => {
                let lobes = self.lobes.lock().unwrap();
                for slot in lobes.values() {
                    if !matches!(*slot.health.lock().unwrap(), LobeHealth::Healthy) {
                        continue;
                    }
                    let mut guard = slot.store.lock().unwrap();
                    if let Some(store) = guard.as_mut() {
                        let result = store.correct(id, correction, action);
                        if result.corrected {
                            return Ok(result);
                        }
                    }
                }
                Ok(CorrectResult {
                    corrected: false,
                    error: Some(format!("Entry '{id}' not found in any lobe.")),
                    ..Default::default()
                })
            }
        }
    }

    fn try_correct_in(&self, global: &Mutex<EntryStore>, id: &str, correction: &str, action: CorrectAction) -> Option<CorrectResult> {
        let mut store = global.lock().unwrap();
        if store.all_entries().any(|e| e.id == id) {
            return Some(store.correct(id, correction, action));
        }
        None
    }

    pub fn briefing(&self, lobe: Option<&str>) -> Result<BriefingResult, LobeError> {
        self.maybe_hot_reload();
        let lobes = self.lobes.lock().unwrap();
        let name = match lobe {
            Some(n) => n.to_string(),
            None if lobes.len() == 1 => lobes.keys().next().unwrap().clone(),
            None => return Err(LobeError::Ambiguous),
        };
        let slot = lobes.get(&name).ok_or(LobeError::Unknown(name.clone()))?;
        self.ensure_healthy(slot, &name)?;
        let guard = slot.store.lock().unwrap();
        let store = guard.as_ref().ok_or(LobeError::Unknown(name))?;
        Ok(store.briefing())
    }

    pub fn context_search(
        &self,
        lobe: Option<&str>,
        context: &str,
        max: usize,
        reference_filter: Option<&str>,
        min_match: f64,
    ) -> Result<Vec<ContextHit>, LobeError> {
        self.maybe_hot_reload();
        let context_keywords = analyzer::extract_keywords(context);
        let weak_floor = (2usize).max((CROSS_LOBE_WEAK_MATCH_PENALTY * context_keywords.len() as f64).ceil() as usize);

        let lobes = self.lobes.lock().unwrap();
        let mut hits: Vec<ContextHit> = Vec::new();

        let primary = match lobe {
            Some(n) => Some(n.to_string()),
            None if lobes.len() == 1 => lobes.keys().next().cloned(),
            None => None,
        };

        for (name, slot) in lobes.iter() {
            if let Some(n) = &primary {
                if n != name {
                    continue;
                }
            }
            if !matches!(*slot.health.lock().unwrap(), LobeHealth::Healthy) {
                continue;
            }
            let guard = slot.store.lock().unwrap();
            let Some(store) = guard.as_ref() else { continue };
            let mut local = store.context_search(context, max, reference_filter, min_match);
            if primary.is_none() {
                for hit in &mut local {
                    if hit.matched_keywords.len() < weak_floor {
                        hit.score *= CROSS_LOBE_WEAK_MATCH_PENALTY;
                    }
                }
            }
            hits.extend(local);
        }
        drop(lobes);

        let global = self.global_store.lock().unwrap();
        hits.extend(global.context_search(context, max, reference_filter, 0.0));

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(max);
        Ok(hits)
    }

    pub fn bootstrap(&self, lobe: &str, seeds: Vec<BootstrapSeed>) -> Result<Vec<StoreResult>, LobeError> {
        let lobes = self.lobes.lock().unwrap();
        let slot = lobes.get(lobe).ok_or(LobeError::Unknown(lobe.to_string()))?;
        self.ensure_healthy(slot, lobe)?;
        let mut guard = slot.store.lock().unwrap();
        let store = guard.as_mut().ok_or(LobeError::Unknown(lobe.to_string()))?;
        Ok(store.bootstrap(seeds, &self.tfidf_model))
    }

    pub fn create_lobe(&self, name: &str, root: PathBuf, budget_mb: u64) {
        let cfg = LobeConfig {
            root,
            budget_mb,
            memory_dir: None,
        };
        let slot = self.build_lobe_slot(&cfg);
        self.lobes.lock().unwrap().insert(name.to_string(), slot);
    }

    pub fn stats(&self, lobe: Option<&str>) -> Result<HashMap<String, StatsResult>, LobeError> {
        self.maybe_hot_reload();
        let mut out = HashMap::new();
        let lobes = self.lobes.lock().unwrap();

        match lobe {
            Some(name) => {
                let slot = lobes.get(name).ok_or(LobeError::Unknown(name.to_string()))?;
                let guard = slot.store.lock().unwrap();
                if let Some(store) = guard.as_ref() {
                    out.insert(name.to_string(), store.stats());
                }
            }
            None => {
                for (name, slot) in lobes.iter() {
                    let guard = slot.store.lock().unwrap();
                    if let Some(store) = guard.as_ref() {
                        out.insert(name.clone(), store.stats());
                    }
                }
            }
        }
        out.insert("global".to_string(), self.global_store.lock().unwrap().stats());
        Ok(out)
    }

    pub fn lobe_health(&self, name: &str) -> Option<LobeHealth> {
        self.lobes.lock().unwrap().get(name).map(|s| s.health.lock().unwrap().clone())
    }

    pub fn lobe_info(&self, name: &str) -> Option<(PathBuf, PathBuf, u64)> {
        self.lobes
            .lock()
            .unwrap()
            .get(name)
            .map(|s| (s.root.clone(), s.memory_path.clone(), s.budget_bytes))
    }

    pub fn config_origin_label(&self) -> &'static str {
        self.config_origin.as_str()
    }

    fn resolve_write_lobe(&self, lobe: Option<&str>) -> Result<String, LobeError> {
        if let Some(name) = lobe {
            return Ok(name.to_string());
        }
        let lobes = self.lobes.lock().unwrap();
        if lobes.len() == 1 {
            return Ok(lobes.keys().next().unwrap().clone());
        }
        Err(LobeError::Ambiguous)
    }

    fn ensure_healthy(&self, slot: &LobeSlot, name: &str) -> Result<(), LobeError> {
        match &*slot.health.lock().unwrap() {
            LobeHealth::Healthy => Ok(()),
            LobeHealth::Degraded { reason, recovery_steps } => Err(LobeError::Degraded {
                lobe: name.to_string(),
                reason: reason.clone(),
                recovery_steps: recovery_steps.clone(),
            }),
        }
    }
}

fn lobe_cfg_path(cfg: &LobeConfig) -> PathBuf {
    cfg.root.join(cfg.memory_dir.clone().unwrap_or_else(|| config::DEFAULT_MEMORY_DIR.to_string()))
}

#[derive(Debug, Clone)]
pub enum LobeError {
    Unknown(String),
    Degraded {
        lobe: String,
        reason: String,
        recovery_steps: Vec<String>,
    },
    Ambiguous,
}

impl std::fmt::Display for LobeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobeError::Unknown(name) => write!(
                f,
                "Unknown lobe '{name}'. Auto-add it via bootstrap (with `root`), or add it to memory-config.json."
            ),
            LobeError::Degraded { lobe, reason, recovery_steps } => {
                write!(f, "Lobe '{lobe}' is degraded ({reason}). {}", recovery_steps.join(" "))
            }
            LobeError::Ambiguous => write!(f, "Multiple lobes configured; specify `lobe` explicitly."),
        }
    }
}

impl std::error::Error for LobeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, lobes_json: &str) -> PathBuf {
        let path = dir.path().join("memory-config.json");
        std::fs::write(&path, lobes_json).unwrap();
        path
    }

    #[test]
    fn single_lobe_defaults_on_write_and_query() {
        let dir = TempDir::new().unwrap();
        let lobe_root = dir.path().join("repo");
        std::fs::create_dir_all(&lobe_root).unwrap();
        let cfg_path = write_config(
            &dir,
            &format!(
                r#"{{"lobes": {{"repo": {{"root": "{}", "budgetMB": 50}}}}}}"#,
                lobe_root.display()
            ),
        );

        let coordinator = Coordinator::bootstrap_new(Some(&cfg_path));
        assert_eq!(coordinator.server_mode(), ServerMode::Running);

        let result = coordinator
            .store(
                None,
                Topic::Architecture,
                "Pattern",
                "Uses a layered architecture with clear module boundaries.",
                vec![],
                vec![],
                None,
                std::collections::BTreeSet::new(),
                None,
                None,
            )
            .unwrap();
        assert!(result.stored);

        let (result, labels) = coordinator.query(None, "architecture", Detail::Brief, None, None).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(labels, vec!["repo".to_string()]);
    }

    #[test]
    fn global_topics_route_to_global_store_across_lobes() {
        let dir = TempDir::new().unwrap();
        let lobe_a = dir.path().join("a");
        let lobe_b = dir.path().join("b");
        std::fs::create_dir_all(&lobe_a).unwrap();
        std::fs::create_dir_all(&lobe_b).unwrap();
        let cfg_path = write_config(
            &dir,
            &format!(
                r#"{{"lobes": {{"a": {{"root": "{}"}}, "b": {{"root": "{}"}}}}}}"#,
                lobe_a.display(),
                lobe_b.display()
            ),
        );

        let coordinator = Coordinator::bootstrap_new(Some(&cfg_path));
        let result = coordinator
            .store(
                Some("a"),
                Topic::Preferences,
                "Editor",
                "Prefers vim keybindings across all sessions and projects.",
                vec![],
                vec![],
                None,
                std::collections::BTreeSet::new(),
                None,
                None,
            )
            .unwrap();
        assert!(result.stored);

        let (result_a, label_a) = coordinator.query(Some("a"), "preferences", Detail::Brief, None, None).unwrap();
        let (result_b, _label_b) = coordinator.query(Some("b"), "preferences", Detail::Brief, None, None).unwrap();
        assert_eq!(result_a.entries.len(), 1);
        assert_eq!(result_b.entries.len(), 1);
        assert_eq!(label_a, vec!["global".to_string()]);
    }

    #[test]
    fn unknown_lobe_is_an_error() {
        let dir = TempDir::new().unwrap();
        let lobe_root = dir.path().join("repo");
        std::fs::create_dir_all(&lobe_root).unwrap();
        let cfg_path = write_config(
            &dir,
            &format!(r#"{{"lobes": {{"repo": {{"root": "{}"}}}}}}"#, lobe_root.display()),
        );
        let coordinator = Coordinator::bootstrap_new(Some(&cfg_path));

        let err = coordinator
            .query(Some("missing"), "architecture", Detail::Brief, None, None)
            .unwrap_err();
        assert!(matches!(err, LobeError::Unknown(_)));
    }

    #[test]
    fn empty_lobe_map_is_safe_mode() {
        let dir = TempDir::new().unwrap();
        let cfg_path = write_config(&dir, r#"{"lobes": {}}"#);
        let coordinator = Coordinator::bootstrap_new(Some(&cfg_path));
        assert_eq!(coordinator.server_mode(), ServerMode::SafeMode);
    }
}
