//! Normalizer (component G). Pre-processes raw tool arguments at the
//! transport boundary: alias resolution, wildcard normalization, lobe and
//! scope defaulting. Pure, no I/O.

use std::collections::HashMap;

/// Resolve aliases onto canonical keys, only when the canonical key is
/// absent. `is_store` enables the store-only `scope -> topic` alias.
pub fn resolve_aliases(mut args: HashMap<String, String>, is_store: bool) -> HashMap<String, String> {
    let alias_groups: &[(&str, &[&str])] = &[
        ("title", &["key", "name"]),
        ("content", &["value", "body", "text"]),
        ("filter", &["query", "search"]),
        ("lobe", &["workspace", "repo"]),
        ("context", &["description", "task"]),
        ("references", &["refs"]),
    ];

    for (canonical, aliases) in alias_groups {
        if args.contains_key(*canonical) {
            continue;
        }
        for alias in *aliases {
            if let Some(value) = args.remove(*alias) {
                args.insert(canonical.to_string(), value);
                break;
            }
        }
    }

    if is_store && !args.contains_key("topic") {
        if let Some(value) = args.remove("scope") {
            args.insert("topic".to_string(), value);
        }
    }

    args
}

const WILDCARD_ALIASES: &[&str] = &["all", "everything", "global", "project"];

/// `all/everything/global/project` (case-insensitive) normalize to `*`.
pub fn normalize_wildcard(value: &str) -> String {
    if WILDCARD_ALIASES.contains(&value.to_lowercase().as_str()) {
        "*".to_string()
    } else {
        value.to_string()
    }
}

/// Empty/missing lobe defaults to the sole configured lobe when exactly one
/// exists.
pub fn default_lobe<'a>(requested: Option<&'a str>, configured: &'a [String]) -> Option<&'a str> {
    match requested {
        Some(l) if !l.is_empty() => Some(l),
        _ if configured.len() == 1 => Some(configured[0].as_str()),
        _ => requested.filter(|l| !l.is_empty()),
    }
}

/// For `query`: if `filter` is present and `scope` is absent, default scope
/// to `*`.
pub fn default_query_scope(scope: Option<String>, filter: Option<&str>) -> Option<String> {
    match (scope, filter) {
        (None, Some(f)) if !f.is_empty() => Some("*".to_string()),
        (scope, _) => scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution_prefers_canonical_when_present() {
        let mut args = HashMap::new();
        args.insert("title".to_string(), "Canonical".to_string());
        args.insert("key".to_string(), "Alias".to_string());
        let resolved = resolve_aliases(args, false);
        assert_eq!(resolved.get("title").unwrap(), "Canonical");
    }

    #[test]
    fn alias_resolution_falls_back_to_alias() {
        let mut args = HashMap::new();
        args.insert("workspace".to_string(), "backend".to_string());
        let resolved = resolve_aliases(args, false);
        assert_eq!(resolved.get("lobe").unwrap(), "backend");
    }

    #[test]
    fn scope_to_topic_alias_only_applies_for_store() {
        let mut args = HashMap::new();
        args.insert("scope".to_string(), "architecture".to_string());
        let resolved = resolve_aliases(args.clone(), true);
        assert_eq!(resolved.get("topic").unwrap(), "architecture");

        let resolved = resolve_aliases(args, false);
        assert!(!resolved.contains_key("topic"));
    }

    #[test]
    fn wildcard_normalization_is_case_insensitive() {
        for w in ["all", "Everything", "GLOBAL", "project"] {
            assert_eq!(normalize_wildcard(w), "*");
        }
        assert_eq!(normalize_wildcard("architecture"), "architecture");
    }

    #[test]
    fn default_lobe_picks_sole_configured_lobe() {
        let configured = vec!["only".to_string()];
        assert_eq!(default_lobe(None, &configured), Some("only"));
        assert_eq!(default_lobe(Some(""), &configured), Some("only"));
    }

    #[test]
    fn query_scope_defaults_to_wildcard_when_filter_present() {
        assert_eq!(default_query_scope(None, Some("reducer")), Some("*".to_string()));
        assert_eq!(default_query_scope(Some("gotchas".to_string()), Some("reducer")), Some("gotchas".to_string()));
        assert_eq!(default_query_scope(None, None), None);
    }
}
