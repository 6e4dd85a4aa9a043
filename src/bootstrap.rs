//! Bootstrap heuristic scanner — the concrete implementation behind the
//! opaque `(topic, title, content, sources)` seed callback the entry store
//! consumes (§6). Walks the repo root the way the teacher's own workspace
//! scanner does, respecting `.gitignore`.

use crate::store::BootstrapSeed;
use ignore::WalkBuilder;
use std::path::Path;

const MAX_DEPTH: usize = 2;

struct Heuristic {
    filename: &'static str,
    topic: &'static str,
    title: &'static str,
    describe: fn(&str) -> String,
}

fn describe_manifest(name: &str) -> String {
    format!("This repository is built around `{name}`; check it for the dependency graph and build scripts.")
}

fn describe_readme(_name: &str) -> String {
    "A README is present at the repo root; consult it for project purpose and setup instructions.".to_string()
}

fn describe_ci(name: &str) -> String {
    format!("CI configuration found at `{name}`; follow its steps for the canonical build/test commands.")
}

fn describe_lint(name: &str) -> String {
    format!("Lint/format configuration at `{name}` defines this repo's style conventions.")
}

const HEURISTICS: &[Heuristic] = &[
    Heuristic { filename: "Cargo.toml", topic: "architecture", title: "Rust workspace manifest", describe: describe_manifest },
    Heuristic { filename: "package.json", topic: "architecture", title: "Node package manifest", describe: describe_manifest },
    Heuristic { filename: "pyproject.toml", topic: "architecture", title: "Python project manifest", describe: describe_manifest },
    Heuristic { filename: "go.mod", topic: "architecture", title: "Go module manifest", describe: describe_manifest },
    Heuristic { filename: "README.md", topic: "user", title: "Project README", describe: describe_readme },
    Heuristic { filename: ".github/workflows", topic: "conventions", title: "CI workflow", describe: describe_ci },
    Heuristic { filename: ".eslintrc.json", topic: "conventions", title: "ESLint configuration", describe: describe_lint },
    Heuristic { filename: "rustfmt.toml", topic: "conventions", title: "rustfmt configuration", describe: describe_lint },
    Heuristic { filename: ".pre-commit-config.yaml", topic: "conventions", title: "pre-commit configuration", describe: describe_lint },
];

/// Scan `repo_root` for well-known marker files/directories and turn each
/// hit into a seed. Depth-limited and `.gitignore`-aware so large
/// repositories don't trigger a full tree walk just to bootstrap.
pub fn scan_repo_for_seeds(repo_root: &Path) -> Vec<BootstrapSeed> {
    let mut seeds = Vec::new();

    let walker = WalkBuilder::new(repo_root)
        .standard_filters(true)
        .max_depth(Some(MAX_DEPTH))
        .build();

    for entry in walker.filter_map(|e| e.ok()) {
        let Ok(rel) = entry.path().strip_prefix(repo_root) else {
            continue;
        };
        let rel_str = rel.to_string_lossy();
        if rel_str.is_empty() {
            continue;
        }

        for h in HEURISTICS {
            if rel_str == h.filename || rel_str.ends_with(&format!("/{}", h.filename)) {
                seeds.push(BootstrapSeed {
                    topic: h.topic.to_string(),
                    title: h.title.to_string(),
                    content: (h.describe)(&rel_str),
                    sources: vec![rel_str.to_string()],
                });
            }
        }
    }

    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_cargo_manifest_and_readme() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"").unwrap();
        std::fs::write(dir.path().join("README.md"), "# X").unwrap();

        let seeds = scan_repo_for_seeds(dir.path());
        assert!(seeds.iter().any(|s| s.title == "Rust workspace manifest"));
        assert!(seeds.iter().any(|s| s.title == "Project README"));
    }

    #[test]
    fn empty_repo_yields_no_seeds() {
        let dir = TempDir::new().unwrap();
        let seeds = scan_repo_for_seeds(dir.path());
        assert!(seeds.is_empty());
    }
}
