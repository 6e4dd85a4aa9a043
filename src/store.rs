//! Entry Store (component D) — one-file-per-entry markdown persistence,
//! in-memory mirror, CRUD, stats, dedup/conflict/stale detection.

use crate::analyzer::{self, Matchable};
use crate::clock::{system_clock, SharedClock};
use crate::entry::{Entry, Topic, Trust};
use crate::ephemeral;
use crate::tfidf::TfidfModel;
use rand::Rng;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    pub stale_days_standard: i64,
    pub stale_days_preferences: i64,
    pub max_stale_in_briefing: usize,
    pub max_dedup_suggestions: usize,
    pub max_conflict_pairs: usize,
    pub dedup_threshold: f64,
    pub preference_surface_threshold: f64,
    pub conflict_threshold: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            stale_days_standard: 30,
            stale_days_preferences: 90,
            max_stale_in_briefing: 5,
            max_dedup_suggestions: 3,
            max_conflict_pairs: 2,
            dedup_threshold: 0.55,
            preference_surface_threshold: 0.5,
            conflict_threshold: 0.6,
        }
    }
}

pub struct StoreConfig {
    pub repo_root: PathBuf,
    pub memory_path: PathBuf,
    pub storage_budget_bytes: u64,
    pub clock: SharedClock,
    pub behavior: BehaviorConfig,
}

impl StoreConfig {
    pub fn new(repo_root: impl Into<PathBuf>, memory_path: impl Into<PathBuf>, storage_budget_bytes: u64) -> Self {
        Self {
            repo_root: repo_root.into(),
            memory_path: memory_path.into(),
            storage_budget_bytes,
            clock: system_clock(),
            behavior: BehaviorConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorConfig) -> Self {
        self.behavior = behavior;
        self
    }
}

pub struct EntryStore {
    config: StoreConfig,
    in_memory: HashMap<String, Entry>,
    corrupt_count: usize,
    total_bytes: u64,
}

// ─────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RelatedEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StoreResult {
    pub stored: bool,
    pub id: Option<String>,
    pub topic: Option<String>,
    pub confidence: Option<f64>,
    pub warning: Option<String>,
    pub related_entries: Vec<RelatedEntry>,
    pub relevant_preferences: Vec<RelatedEntry>,
    pub ephemeral_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Brief,
    Standard,
    Full,
}

#[derive(Debug, Clone)]
pub struct ProjectedEntry {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub confidence: f64,
    pub fresh: bool,
    pub summary: String,
    pub references: Option<Vec<String>>,
    pub tags: Option<BTreeSet<String>>,
    pub content: Option<String>,
    pub sources: Option<Vec<String>>,
    pub git_sha: Option<String>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ConflictPair {
    pub a_id: String,
    pub a_title: String,
    pub b_id: String,
    pub b_title: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub entries: Vec<ProjectedEntry>,
    pub conflicts: Vec<ConflictPair>,
}

#[derive(Debug, Clone, Default)]
pub struct CorrectResult {
    pub corrected: bool,
    pub new_confidence: Option<f64>,
    pub trust: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StaleDetail {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub days_since_access: i64,
}

#[derive(Debug, Clone, Default)]
pub struct BriefingResult {
    pub summary: String,
    pub entry_count: usize,
    pub stale_entries: usize,
    pub stale_details: Option<Vec<StaleDetail>>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Freshness {
    pub fresh: usize,
    pub stale: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StatsResult {
    pub total_entries: usize,
    pub by_topic: HashMap<String, usize>,
    pub by_trust: HashMap<String, usize>,
    pub by_freshness: Freshness,
    pub storage_size: u64,
    pub storage_budget_bytes: u64,
    pub memory_path: PathBuf,
    pub corrupt_files: usize,
    pub oldest_entry: Option<chrono::DateTime<chrono::Utc>>,
    pub newest_entry: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
pub struct ContextHit {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub score: f64,
    pub matched_keywords: Vec<String>,
}

/// A `(topic, title, content, sources)` seed produced by the bootstrap
/// heuristic — an opaque external collaborator per spec §1/§4.D.
pub struct BootstrapSeed {
    pub topic: String,
    pub title: String,
    pub content: String,
    pub sources: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────
// Implementation
// ─────────────────────────────────────────────────────────────────────────

impl EntryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            in_memory: HashMap::new(),
            corrupt_count: 0,
            total_bytes: 0,
        }
    }

    pub fn memory_path(&self) -> &Path {
        &self.config.memory_path
    }

    /// Create `memoryPath` if absent and load existing files.
    pub fn init(&mut self) -> crate::error::Result<()> {
        std::fs::create_dir_all(&self.config.memory_path)
            .map_err(|e| crate::error::io_err(&self.config.memory_path, e))?;
        self.in_memory.clear();
        self.corrupt_count = 0;
        self.total_bytes = 0;
        let memory_path = self.config.memory_path.clone();
        self.scan_dir(&memory_path)
            .map_err(|e| crate::error::io_err(&memory_path, e))?;
        tracing::info!(
            path = %self.config.memory_path.display(),
            entries = self.in_memory.len(),
            corrupt = self.corrupt_count,
            "entry store initialized"
        );
        Ok(())
    }

    fn scan_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.scan_dir(&path)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match Entry::from_markdown(stem, &text) {
                Some(parsed) => {
                    self.total_bytes += bytes;
                    self.in_memory.insert(parsed.id.clone(), parsed);
                }
                None => {
                    self.corrupt_count += 1;
                }
            }
        }
        Ok(())
    }

    fn topic_dir(&self, topic: &Topic, branch: Option<&str>) -> PathBuf {
        if topic.is_recent_work() {
            let branch = branch.map(Entry::sanitize_branch).unwrap_or_else(|| "unknown".to_string());
            self.config.memory_path.join("recent-work").join(branch)
        } else {
            self.config.memory_path.join(topic.dir_name())
        }
    }

    fn entry_path(&self, entry: &Entry) -> PathBuf {
        self.topic_dir(&entry.topic, entry.branch.as_deref()).join(entry.filename())
    }

    fn generate_id(&self, topic: &Topic) -> String {
        let prefix = topic.id_prefix();
        loop {
            let hex: String = {
                let mut rng = rand::thread_rng();
                (0..8)
                    .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
                    .collect()
            };
            let id = format!("{prefix}-{hex}");
            if !self.in_memory.contains_key(&id) {
                return id;
            }
        }
    }

    fn find_by_topic_title(&self, topic: &Topic, title: &str) -> Option<&Entry> {
        self.in_memory
            .values()
            .find(|e| &e.topic == topic && e.title == title)
    }

    fn current_branch(&self) -> String {
        current_git_branch(&self.config.repo_root)
    }

    pub fn stale_days_for(&self, topic: &Topic) -> Option<i64> {
        match topic {
            Topic::User => None,
            Topic::Preferences => Some(self.config.behavior.stale_days_preferences),
            _ => Some(self.config.behavior.stale_days_standard),
        }
    }

    pub fn is_fresh(&self, topic: &Topic, last_accessed: chrono::DateTime<chrono::Utc>) -> bool {
        let Some(threshold_days) = self.stale_days_for(topic) else {
            return true;
        };
        let age = self.config.clock.now().signed_duration_since(last_accessed);
        age.num_days() < threshold_days
    }

    // ── store ──────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        topic: Topic,
        title: &str,
        content: &str,
        sources: Vec<String>,
        references: Vec<String>,
        trust: Option<Trust>,
        tags: BTreeSet<String>,
        branch: Option<String>,
        git_sha: Option<String>,
        tfidf_model: &TfidfModel,
    ) -> StoreResult {
        let trust = trust.unwrap_or_default();
        let confidence = trust.confidence();
        let now = self.config.clock.now();

        let branch = if topic.is_recent_work() {
            Some(branch.unwrap_or_else(|| self.current_branch()))
        } else {
            None
        };

        let candidate = Entry {
            id: String::new(),
            topic: topic.clone(),
            title: title.to_string(),
            content: content.to_string(),
            sources,
            references,
            tags,
            trust,
            confidence,
            created: now,
            last_accessed: now,
            branch: branch.clone(),
            git_sha,
            corrected: false,
        };

        // Step 3: budget check happens before the overwrite's old file is
        // removed, so it still counts the about-to-be-replaced file's size.
        let estimated_size = candidate.to_markdown().len() as u64;
        if self.total_bytes + estimated_size > self.config.storage_budget_bytes {
            return StoreResult {
                stored: false,
                warning: Some(format!(
                    "Storage budget exceeded: writing this entry would use {} bytes, budget is {} bytes.",
                    self.total_bytes + estimated_size,
                    self.config.storage_budget_bytes
                )),
                ..Default::default()
            };
        }

        // Step 4: overwrite detection (not recent-work).
        let mut warning_parts = Vec::new();
        if !topic.is_recent_work() {
            if let Some(existing) = self.find_by_topic_title(&topic, title).cloned() {
                let old_path = self.entry_path(&existing);
                let old_bytes = std::fs::metadata(&old_path).map(|m| m.len()).unwrap_or(0);
                let _ = std::fs::remove_file(&old_path);
                self.in_memory.remove(&existing.id);
                self.total_bytes = self.total_bytes.saturating_sub(old_bytes);
                warning_parts.push(format!("Overwrote existing entry '{title}'."));
            }
        }

        // Step 5: id generation with collision retry.
        let id = self.generate_id(&topic);
        let mut entry = candidate;
        entry.id = id.clone();

        // Step 6: write file (create-then-rename for atomic visibility).
        let dir = self.topic_dir(&topic, entry.branch.as_deref());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(error = %e, "failed to create topic directory");
            return StoreResult {
                stored: false,
                warning: Some(format!("Failed to create directory: {e}")),
                ..Default::default()
            };
        }
        let final_path = dir.join(entry.filename());
        let tmp_path = dir.join(format!("{}.tmp", entry.id));
        let markdown = entry.to_markdown();
        if let Err(e) = std::fs::write(&tmp_path, markdown.as_bytes()) {
            return StoreResult {
                stored: false,
                warning: Some(format!("Failed to write entry: {e}")),
                ..Default::default()
            };
        }
        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            return StoreResult {
                stored: false,
                warning: Some(format!("Failed to finalize entry write: {e}")),
                ..Default::default()
            };
        }

        // Step 7: insert into in-memory mirror.
        self.total_bytes += markdown.len() as u64;
        self.in_memory.insert(entry.id.clone(), entry.clone());

        // Step 8: dedup detection (same topic).
        let related_entries = self.find_related(&entry, &topic, self.config.behavior.dedup_threshold, self.config.behavior.max_dedup_suggestions, |t| t == &topic);

        // Step 9: preference surfacing (cross-topic, non-preferences entries only).
        let relevant_preferences = if topic != Topic::Preferences {
            self.find_related(
                &entry,
                &topic,
                self.config.behavior.preference_surface_threshold,
                usize::MAX,
                |t| t == &Topic::Preferences,
            )
        } else {
            Vec::new()
        };

        // Step 10: ephemerality check (skipped entirely for recent-work).
        let ephemeral_warning = if topic.is_recent_work() {
            None
        } else {
            ephemeral::classify(&topic.as_string(), &entry.title, &entry.content, tfidf_model)
        };

        tracing::info!(id = %entry.id, topic = %topic, "entry stored");

        if !warning_parts.is_empty() {
            warning_parts.push("".to_string());
        }
        StoreResult {
            stored: true,
            id: Some(entry.id),
            topic: Some(topic.as_string()),
            confidence: Some(entry.confidence),
            warning: if warning_parts.is_empty() {
                None
            } else {
                Some(warning_parts.join(" ").trim().to_string())
            },
            related_entries,
            relevant_preferences,
            ephemeral_warning,
        }
    }

    fn find_related(
        &self,
        entry: &Entry,
        _topic: &Topic,
        threshold: f64,
        cap: usize,
        predicate: impl Fn(&Topic) -> bool,
    ) -> Vec<RelatedEntry> {
        let mut scored: Vec<(f64, RelatedEntry)> = self
            .in_memory
            .values()
            .filter(|other| other.id != entry.id && predicate(&other.topic))
            .map(|other| {
                let sim = analyzer::hybrid_similarity(&entry.title, &entry.content, &other.title, &other.content);
                (
                    sim,
                    RelatedEntry {
                        id: other.id.clone(),
                        title: other.title.clone(),
                        content: other.content.clone(),
                        confidence: other.confidence,
                    },
                )
            })
            .filter(|(sim, _)| *sim > threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(cap);
        scored.into_iter().map(|(_, r)| r).collect()
    }

    // ── query ──────────────────────────────────────────────────────────────

    pub fn query(
        &self,
        scope: &str,
        detail: Detail,
        filter_raw: Option<&str>,
        branch: Option<&str>,
    ) -> QueryResult {
        let parsed_filter = analyzer::parse_filter(filter_raw.unwrap_or(""));
        let current_branch = self.current_branch();

        let mut candidates: Vec<&Entry> = self
            .in_memory
            .values()
            .filter(|e| self.in_scope(e, scope))
            .filter(|e| self.in_branch_scope(e, scope, branch, &current_branch))
            .collect();

        candidates.retain(|e| {
            let tags = &e.tags;
            let m = Matchable {
                title: &e.title,
                content: &e.content,
                tags,
            };
            analyzer::matches_filter(&m, &parsed_filter)
        });

        let has_filter = !parsed_filter.is_empty();
        // Relevance scoring is independent per entry; parallelize the way the
        // teacher's hybrid_search does for its per-entry score computation.
        let mut scored: Vec<(f64, &Entry)> = candidates
            .into_par_iter()
            .map(|e| {
                let tags = &e.tags;
                let m = Matchable {
                    title: &e.title,
                    content: &e.content,
                    tags,
                };
                let score = analyzer::relevance_score(&m, &parsed_filter, e.confidence);
                (score, e)
            })
            .collect();

        scored.sort_by(|a, b| {
            let primary = if has_filter {
                b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                b.1.confidence.partial_cmp(&a.1.confidence).unwrap_or(std::cmp::Ordering::Equal)
            };
            primary.then_with(|| b.1.last_accessed.cmp(&a.1.last_accessed))
        });

        let entries: Vec<ProjectedEntry> = scored
            .iter()
            .map(|(score, e)| self.project(e, detail, *score))
            .collect();

        let full_entries: Vec<Entry> = scored.iter().map(|(_, e)| (*e).clone()).collect();
        let conflicts = self.detect_conflicts(&full_entries);

        QueryResult { entries, conflicts }
    }

    fn in_scope(&self, e: &Entry, scope: &str) -> bool {
        if scope == "*" {
            return true;
        }
        e.topic.as_string() == scope
    }

    fn in_branch_scope(&self, e: &Entry, scope: &str, branch: Option<&str>, current_branch: &str) -> bool {
        if scope != "recent-work" && scope != "*" {
            return true;
        }
        if !e.topic.is_recent_work() {
            return true;
        }
        match branch {
            None => e.branch.as_deref() == Some(current_branch),
            Some("*") => true,
            Some(b) => e.branch.as_deref() == Some(b),
        }
    }

    fn project(&self, e: &Entry, detail: Detail, score: f64) -> ProjectedEntry {
        let fresh = self.is_fresh(&e.topic, e.last_accessed);
        let summary = summarize(&e.content, 160);
        ProjectedEntry {
            id: e.id.clone(),
            title: e.title.clone(),
            topic: e.topic.as_string(),
            confidence: e.confidence,
            fresh,
            summary,
            references: matches!(detail, Detail::Standard | Detail::Full).then(|| e.references.clone()),
            tags: matches!(detail, Detail::Standard | Detail::Full).then(|| e.tags.clone()),
            content: matches!(detail, Detail::Full).then(|| e.content.clone()),
            sources: matches!(detail, Detail::Full).then(|| e.sources.clone()),
            git_sha: matches!(detail, Detail::Full).then(|| e.git_sha.clone()).flatten(),
            last_accessed: e.last_accessed,
            score,
        }
    }

    /// Conflict detection, deliberately cross-topic: runs on whatever result
    /// set the caller provides (§4.D).
    pub fn detect_conflicts(&self, entries: &[Entry]) -> Vec<ConflictPair> {
        let mut pairs = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let a = &entries[i];
                let b = &entries[j];
                if a.content.len() <= 50 || b.content.len() <= 50 {
                    continue;
                }
                let sim = analyzer::hybrid_similarity(&a.title, &a.content, &b.title, &b.content);
                if sim > self.config.behavior.conflict_threshold {
                    pairs.push(ConflictPair {
                        a_id: a.id.clone(),
                        a_title: a.title.clone(),
                        b_id: b.id.clone(),
                        b_title: b.title.clone(),
                        similarity: sim,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        pairs.truncate(self.config.behavior.max_conflict_pairs);
        pairs
    }

    // ── correct ────────────────────────────────────────────────────────────

    pub fn correct(&mut self, id: &str, correction: &str, action: CorrectAction) -> CorrectResult {
        let Some(mut entry) = self.in_memory.get(id).cloned() else {
            return CorrectResult {
                corrected: false,
                error: Some(format!("Entry '{id}' not found.")),
                ..Default::default()
            };
        };

        match action {
            CorrectAction::Delete => {
                let path = self.entry_path(&entry);
                let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                if std::fs::remove_file(&path).is_err() {
                    return CorrectResult {
                        corrected: false,
                        error: Some("Failed to delete entry file.".to_string()),
                        ..Default::default()
                    };
                }
                self.in_memory.remove(id);
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
                CorrectResult {
                    corrected: true,
                    ..Default::default()
                }
            }
            CorrectAction::Replace => {
                if correction.trim().is_empty() {
                    return CorrectResult {
                        corrected: false,
                        error: Some("Replace requires non-empty correction text.".to_string()),
                        ..Default::default()
                    };
                }
                entry.content = correction.to_string();
                entry.trust = Trust::User;
                entry.confidence = Trust::User.confidence();
                entry.last_accessed = self.config.clock.now();
                self.rewrite(entry.clone());
                CorrectResult {
                    corrected: true,
                    new_confidence: Some(entry.confidence),
                    trust: Some(entry.trust.as_str().to_string()),
                    error: None,
                }
            }
            CorrectAction::Append => {
                entry.last_accessed = self.config.clock.now();
                if correction.trim().is_empty() {
                    // Touch: refresh lastAccessed only.
                    self.rewrite(entry.clone());
                    return CorrectResult {
                        corrected: true,
                        new_confidence: Some(entry.confidence),
                        trust: Some(entry.trust.as_str().to_string()),
                        error: None,
                    };
                }
                entry.content = format!("{}\n\n{}", entry.content, correction);
                entry.trust = Trust::User;
                entry.confidence = Trust::User.confidence();
                self.rewrite(entry.clone());
                CorrectResult {
                    corrected: true,
                    new_confidence: Some(entry.confidence),
                    trust: Some(entry.trust.as_str().to_string()),
                    error: None,
                }
            }
        }
    }

    fn rewrite(&mut self, entry: Entry) {
        let path = self.entry_path(&entry);
        let old_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let markdown = entry.to_markdown();
        if std::fs::write(&path, markdown.as_bytes()).is_ok() {
            self.total_bytes = self.total_bytes.saturating_sub(old_bytes) + markdown.len() as u64;
            self.in_memory.insert(entry.id.clone(), entry);
        }
    }

    // ── briefing ───────────────────────────────────────────────────────────

    pub fn briefing(&self) -> BriefingResult {
        if self.in_memory.is_empty() {
            return BriefingResult {
                summary: "No entries yet.".to_string(),
                entry_count: 0,
                stale_entries: 0,
                stale_details: None,
                suggestion: Some(
                    "This store is empty — run bootstrap against the repo root to seed initial entries.".to_string(),
                ),
            };
        }

        let current_branch = self.current_branch();
        let mut sections: Vec<(String, Vec<&Entry>)> = Vec::new();

        let mut by_topic: HashMap<String, Vec<&Entry>> = HashMap::new();
        for e in self.in_memory.values() {
            by_topic.entry(e.topic.as_string()).or_default().push(e);
        }

        let mut push_section = |label: &str, key: &str| {
            if let Some(mut entries) = by_topic.remove(key) {
                entries.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
                sections.push((label.to_string(), entries));
            }
        };

        push_section("About You", "user");
        push_section("Your Preferences", "preferences");
        push_section("Active Gotchas", "gotchas");
        push_section("Architecture", "architecture");
        push_section("Conventions", "conventions");

        let mut module_keys: Vec<String> = by_topic
            .keys()
            .filter(|k| k.starts_with("modules/"))
            .cloned()
            .collect();
        module_keys.sort();
        for key in module_keys {
            let label = key.clone();
            push_section(&label, &key);
        }

        let recent_work: Vec<&Entry> = self
            .in_memory
            .values()
            .filter(|e| e.topic.is_recent_work() && e.branch.as_deref() == Some(current_branch.as_str()))
            .collect();
        if !recent_work.is_empty() {
            sections.push(("Recent Work".to_string(), recent_work));
        }

        let mut summary = String::new();
        for (label, entries) in &sections {
            summary.push_str(&format!("## {label}\n"));
            for e in entries {
                summary.push_str(&format!("- {}: {}\n", e.title, summarize(&e.content, 120)));
            }
            summary.push('\n');
        }

        let mut stale: Vec<&Entry> = self
            .in_memory
            .values()
            .filter(|e| !self.is_fresh(&e.topic, e.last_accessed))
            .collect();
        stale.sort_by(|a, b| {
            let a_gotcha = a.topic == Topic::Gotchas;
            let b_gotcha = b.topic == Topic::Gotchas;
            b_gotcha.cmp(&a_gotcha).then_with(|| {
                let a_age = self.config.clock.now().signed_duration_since(a.last_accessed);
                let b_age = self.config.clock.now().signed_duration_since(b.last_accessed);
                b_age.cmp(&a_age)
            })
        });

        let stale_count = stale.len();
        let stale_details = if stale_count > 0 {
            Some(
                stale
                    .into_iter()
                    .take(self.config.behavior.max_stale_in_briefing)
                    .map(|e| StaleDetail {
                        id: e.id.clone(),
                        title: e.title.clone(),
                        topic: e.topic.as_string(),
                        days_since_access: self
                            .config
                            .clock
                            .now()
                            .signed_duration_since(e.last_accessed)
                            .num_days(),
                    })
                    .collect(),
            )
        } else {
            None
        };

        BriefingResult {
            summary,
            entry_count: self.in_memory.len(),
            stale_entries: stale_count,
            stale_details,
            suggestion: None,
        }
    }

    // ── stats ──────────────────────────────────────────────────────────────

    pub fn stats(&self) -> StatsResult {
        let mut by_topic = HashMap::new();
        let mut by_trust = HashMap::new();
        let mut freshness = Freshness::default();
        let mut oldest = None;
        let mut newest = None;

        for e in self.in_memory.values() {
            *by_topic.entry(e.topic.as_string()).or_insert(0) += 1;
            *by_trust.entry(e.trust.as_str().to_string()).or_insert(0) += 1;

            if self.is_fresh(&e.topic, e.last_accessed) {
                freshness.fresh += 1;
            } else {
                freshness.stale += 1;
            }

            oldest = Some(oldest.map_or(e.created, |o: chrono::DateTime<chrono::Utc>| o.min(e.created)));
            newest = Some(newest.map_or(e.created, |n: chrono::DateTime<chrono::Utc>| n.max(e.created)));
        }

        StatsResult {
            total_entries: self.in_memory.len(),
            by_topic,
            by_trust,
            by_freshness: freshness,
            storage_size: self.total_bytes,
            storage_budget_bytes: self.config.storage_budget_bytes,
            memory_path: self.config.memory_path.clone(),
            corrupt_files: self.corrupt_count,
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }

    // ── bootstrap ────────────────────────────────────────────────────────

    pub fn bootstrap(&mut self, seeds: Vec<BootstrapSeed>, tfidf_model: &TfidfModel) -> Vec<StoreResult> {
        seeds
            .into_iter()
            .map(|seed| {
                let Some(topic) = Topic::parse(&seed.topic) else {
                    return StoreResult {
                        stored: false,
                        warning: Some(format!("Unknown bootstrap topic '{}'.", seed.topic)),
                        ..Default::default()
                    };
                };
                self.store(
                    topic,
                    &seed.title,
                    &seed.content,
                    seed.sources,
                    Vec::new(),
                    Some(Trust::AgentInferred),
                    BTreeSet::new(),
                    None,
                    None,
                    tfidf_model,
                )
            })
            .collect()
    }

    // ── context search ───────────────────────────────────────────────────

    pub fn context_search(
        &self,
        context: &str,
        max: usize,
        reference_filter: Option<&str>,
        min_match: f64,
    ) -> Vec<ContextHit> {
        let context_keywords = analyzer::extract_keywords(context);
        if context_keywords.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for e in self.in_memory.values() {
            if let Some(rf) = reference_filter {
                if !e.references.iter().any(|r| r.contains(rf)) {
                    continue;
                }
            }

            let entry_keywords =
                analyzer::extract_keywords(&format!("{} {} {}", e.title, e.content, e.references.join(" ")));
            let matched: Vec<String> = context_keywords
                .intersection(&entry_keywords)
                .cloned()
                .collect();
            let matched_count = matched.len();

            let topic_boost = if e.topic == Topic::Gotchas || e.topic == Topic::Preferences {
                1.5
            } else {
                1.0
            };

            let mut score = (matched_count as f64 / context_keywords.len() as f64) * topic_boost * e.confidence;

            let reference_bonus = e
                .references
                .iter()
                .any(|r| context_keywords.iter().any(|k| r.to_lowercase().contains(k.as_str())));
            if reference_bonus {
                score += 0.25;
            }

            let is_user = e.topic == Topic::User;
            if !is_user && score < min_match {
                continue;
            }

            hits.push(ContextHit {
                id: e.id.clone(),
                title: e.title.clone(),
                topic: e.topic.as_string(),
                score,
                matched_keywords: matched,
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(max);
        hits
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &Entry> {
        self.in_memory.values()
    }

    pub fn len(&self) -> usize {
        self.in_memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_memory.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectAction {
    Append,
    Replace,
    Delete,
}

fn summarize(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}…", &truncated[..idx]),
        _ => format!("{truncated}…"),
    }
}

fn current_git_branch(repo_root: &Path) -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(repo_root)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "main".to_string())
}
