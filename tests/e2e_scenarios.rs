//! End-to-end scenarios exercising the coordinator's public surface, one
//! test per literal scenario.

use memlobe::clock::FakeClock;
use memlobe::coordinator::Coordinator;
use memlobe::entry::{Topic, Trust};
use memlobe::store::{CorrectAction, Detail};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn single_lobe_coordinator(dir: &TempDir) -> Coordinator {
    let lobe_root = dir.path().join("repo");
    std::fs::create_dir_all(&lobe_root).unwrap();
    let cfg_path = dir.path().join("memory-config.json");
    std::fs::write(
        &cfg_path,
        format!(r#"{{"lobes": {{"repo": {{"root": "{}", "budgetMB": 50}}}}}}"#, lobe_root.display()),
    )
    .unwrap();
    Coordinator::bootstrap_new(Some(&cfg_path))
}

#[test]
fn basic_lifecycle() {
    let dir = TempDir::new().unwrap();
    let coordinator = single_lobe_coordinator(&dir);

    let result = coordinator
        .store(
            None,
            Topic::Architecture,
            "E2E Test Pattern",
            "This repo uses MVI architecture for all feature modules.",
            vec![],
            vec![],
            Some(Trust::User),
            BTreeSet::new(),
            None,
            None,
        )
        .unwrap();
    assert!(result.stored);
    let id = result.id.clone().unwrap();
    assert!(id.starts_with("arch-"));
    assert!((result.confidence.unwrap() - 1.0).abs() < 1e-9);

    let (q, _) = coordinator.query(None, "architecture", Detail::Full, None, None).unwrap();
    assert_eq!(q.entries.len(), 1);
    assert!(q.entries[0].content.as_deref().unwrap().contains("MVI architecture"));

    coordinator.correct(None, &id, "Also uses sealed interfaces for events", CorrectAction::Append).unwrap();
    let (q, _) = coordinator.query(None, "architecture", Detail::Full, None, None).unwrap();
    let content = q.entries[0].content.as_deref().unwrap();
    assert!(content.contains("MVI architecture"));
    assert!(content.contains("sealed interfaces"));

    coordinator.correct(None, &id, "Clean Architecture with MVVM pattern", CorrectAction::Replace).unwrap();
    let (q, _) = coordinator.query(None, "architecture", Detail::Full, None, None).unwrap();
    let content = q.entries[0].content.as_deref().unwrap();
    assert!(content.contains("Clean Architecture"));
    assert!(!content.contains("MVI architecture"));

    coordinator.correct(None, &id, "", CorrectAction::Delete).unwrap();
    let (q, _) = coordinator.query(None, "architecture", Detail::Full, None, None).unwrap();
    assert!(q.entries.is_empty());
}

#[test]
fn budget_enforcement() {
    let dir = TempDir::new().unwrap();
    let lobe_root = dir.path().join("repo");
    std::fs::create_dir_all(&lobe_root).unwrap();
    let cfg_path = dir.path().join("memory-config.json");
    // budgetMB rounds to whole megabytes; use a fresh store directly via a
    // small budget lobe through the coordinator's minimal granularity isn't
    // practical, so this scenario lives at the store layer in store.rs —
    // here we confirm the coordinator surfaces the same warning text.
    std::fs::write(
        &cfg_path,
        format!(r#"{{"lobes": {{"repo": {{"root": "{}", "budgetMB": 0}}}}}}"#, lobe_root.display()),
    )
    .unwrap();
    let coordinator = Coordinator::bootstrap_new(Some(&cfg_path));

    let result = coordinator
        .store(
            None,
            Topic::Conventions,
            "Short",
            "x",
            vec![],
            vec![],
            Some(Trust::AgentInferred),
            BTreeSet::new(),
            None,
            None,
        )
        .unwrap();
    assert!(!result.stored);
    assert!(result.warning.unwrap().to_lowercase().contains("budget"));
}

#[test]
fn stemming_filter_groups() {
    let parsed = memlobe::analyzer::parse_filter("reducer sealed|MVI -deprecated");
    assert_eq!(parsed.groups.len(), 2);
    assert_eq!(
        parsed.groups[0].must,
        BTreeSet::from(["reducer".to_string(), "seal".to_string()])
    );
    assert!(parsed.groups[0].must_not.is_empty());
    assert_eq!(parsed.groups[1].must, BTreeSet::from(["mvi".to_string()]));
    assert_eq!(parsed.groups[1].must_not, BTreeSet::from(["deprecat".to_string()]));
}

#[test]
fn conflict_detection_cross_topic() {
    let dir = TempDir::new().unwrap();
    let coordinator = single_lobe_coordinator(&dir);

    coordinator
        .store(
            None,
            Topic::Architecture,
            "Auth Flow A",
            "The authentication flow validates JWT tokens issued by the identity provider and caches the result for five minutes.",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();
    coordinator
        .store(
            None,
            Topic::Conventions,
            "Auth Flow B",
            "Authentication validates JWT tokens from the identity provider and caches results for five minutes to reduce load.",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();

    let (result, _) = coordinator.query(None, "*", Detail::Brief, None, None).unwrap();
    assert_eq!(result.conflicts.len(), 1);
    assert!(result.conflicts[0].similarity > 0.6);
}

#[test]
fn dedup_surfacing_at_write() {
    let dir = TempDir::new().unwrap();
    let coordinator = single_lobe_coordinator(&dir);

    coordinator
        .store(
            None,
            Topic::Architecture,
            "MVI Pattern",
            "MVI architecture with standalone reducers and ViewModels",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();

    let second = coordinator
        .store(
            None,
            Topic::Architecture,
            "Architecture Overview",
            "MVI architecture pattern with standalone reducers for state management",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();

    assert_eq!(second.related_entries.len(), 1);
    assert_eq!(second.related_entries[0].title, "MVI Pattern");
}

#[test]
fn ephemerality_classification() {
    let dir = TempDir::new().unwrap();
    let coordinator = single_lobe_coordinator(&dir);

    let gotcha = coordinator
        .store(
            None,
            Topic::Gotchas,
            "Build Issue",
            "The build is currently broken and nobody knows why yet.",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();
    assert!(gotcha.stored);
    assert!(gotcha.ephemeral_warning.unwrap().contains("Temporal language"));

    let arch = coordinator
        .store(
            None,
            Topic::Architecture,
            "MVI Pattern",
            "The messaging feature uses MVI with a single reducer and immutable state.",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None,
        )
        .unwrap();
    assert!(arch.ephemeral_warning.is_none());

    let recent = coordinator
        .store(
            None,
            Topic::RecentWork,
            "Current Investigation",
            "Currently debugging the flaky CI job.",
            vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), Some("main".to_string()), None,
        )
        .unwrap();
    assert!(recent.ephemeral_warning.is_none());
}

#[test]
fn staleness_tiers() {
    // Coordinator hot-reload reads real wall-clock mtimes, so fake-clock
    // staleness is exercised directly against an EntryStore (see store.rs's
    // own staleness tests for the clock-injected variant); this confirms
    // the same tier boundaries hold through the plain clock path.
    let clock = FakeClock::new(chrono::Utc::now());
    let dir = TempDir::new().unwrap();
    let mut store = memlobe::store::EntryStore::new(
        memlobe::store::StoreConfig::new(dir.path(), dir.path().join("memory"), 10_000_000)
            .with_clock(std::sync::Arc::new(clock.clone())),
    );
    store.init().unwrap();
    let model = memlobe::tfidf::TfidfModel::seed_v2();

    let pref = store.store(
        Topic::Preferences, "Editor", "Prefers vim keybindings in the editor for all sessions.",
        vec![], vec![], Some(Trust::User), BTreeSet::new(), None, None, &model,
    );
    let gotcha = store.store(
        Topic::Gotchas, "Flaky Test", "The payment integration test is flaky under load on CI runners.",
        vec![], vec![], Some(Trust::AgentInferred), BTreeSet::new(), None, None, &model,
    );
    let user = store.store(
        Topic::User, "About", "Senior backend engineer focused on distributed systems work.",
        vec![], vec![], Some(Trust::User), BTreeSet::new(), None, None, &model,
    );

    clock.advance(chrono::Duration::days(60));
    let q = store.query("preferences", Detail::Brief, None, None);
    assert!(q.entries.iter().find(|e| e.id == pref.id.clone().unwrap()).unwrap().fresh);

    clock.advance(chrono::Duration::days(40));
    let q = store.query("preferences", Detail::Brief, None, None);
    assert!(!q.entries.iter().find(|e| e.id == pref.id.clone().unwrap()).unwrap().fresh);

    let q = store.query("gotchas", Detail::Brief, None, None);
    assert!(!q.entries.iter().find(|e| e.id == gotcha.id.clone().unwrap()).unwrap().fresh);

    clock.advance(chrono::Duration::days(265));
    let q = store.query("user", Detail::Brief, None, None);
    assert!(q.entries.iter().find(|e| e.id == user.id.clone().unwrap()).unwrap().fresh);
}
