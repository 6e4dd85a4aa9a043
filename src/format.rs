//! Formatters (component F). Pure functions: given a query result (plus
//! aggregated tag frequencies), render the markdown body, conflict/stale
//! blocks, and the query footer. No I/O, no clock.

use crate::analyzer::FilterMode;
use crate::store::{ConflictPair, ProjectedEntry, StaleDetail};
use std::collections::HashMap;

const MAX_FOOTER_TAGS: usize = 5;

pub fn merged_body(entries: &[ProjectedEntry]) -> String {
    if entries.is_empty() {
        return "No matching entries.".to_string();
    }

    let mut out = String::new();
    for e in entries {
        let freshness = if e.fresh { "fresh" } else { "stale" };
        out.push_str(&format!(
            "## {} [{}] (confidence {:.2}, {})\n",
            e.title, e.topic, e.confidence, freshness
        ));
        if let Some(content) = &e.content {
            out.push_str(content);
            out.push('\n');
        } else {
            out.push_str(&e.summary);
            out.push('\n');
        }
        if let Some(tags) = &e.tags {
            if !tags.is_empty() {
                out.push_str(&format!("tags: {}\n", tags.iter().cloned().collect::<Vec<_>>().join(", ")));
            }
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn conflict_block(conflicts: &[ConflictPair]) -> Option<String> {
    if conflicts.is_empty() {
        return None;
    }
    let mut out = String::from("⚠ Potential conflicts:\n");
    for c in conflicts {
        out.push_str(&format!(
            "- \"{}\" vs \"{}\" (similarity {:.2})\n",
            c.a_title, c.b_title, c.similarity
        ));
    }
    Some(out.trim_end().to_string())
}

pub fn stale_block(stale: &[StaleDetail]) -> Option<String> {
    if stale.is_empty() {
        return None;
    }
    let mut out = String::from("Stale entries:\n");
    for s in stale {
        out.push_str(&format!(
            "- {} [{}] — {} days since last access\n",
            s.title, s.topic, s.days_since_access
        ));
    }
    Some(out.trim_end().to_string())
}

fn mode_label(mode: FilterMode) -> String {
    match mode {
        FilterMode::NoFilter => "no-filter".to_string(),
        FilterMode::TagOnly => "tag-only".to_string(),
        FilterMode::KeywordOnly => "keyword-only".to_string(),
        FilterMode::Complex { has_tags, has_exact, has_not, has_or } => format!(
            "complex{{hasTags={has_tags}, hasExact={has_exact}, hasNot={has_not}, hasOr={has_or}}}"
        ),
    }
}

/// Footer echoing the parsed filter mode, the top-N tags by frequency, and
/// a one-line filter-syntax reminder.
pub fn query_footer(mode: FilterMode, tag_frequencies: &HashMap<String, usize>) -> String {
    let mut tags: Vec<(&String, &usize)> = tag_frequencies.iter().collect();
    tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top_tags: Vec<String> = tags.into_iter().take(MAX_FOOTER_TAGS).map(|(t, _)| t.clone()).collect();

    let tags_line = if top_tags.is_empty() {
        "no tags observed in this result set".to_string()
    } else {
        format!("top tags: {}", top_tags.join(", "))
    };

    format!(
        "mode: {} | {} | filter syntax: \"term1 term2|term3 -exclude #tag =exact\" (space=AND, |=OR, -=NOT, #=tag, ==exact)",
        mode_label(mode),
        tags_line
    )
}

pub fn tag_frequencies(entries: &[ProjectedEntry]) -> HashMap<String, usize> {
    let mut freq = HashMap::new();
    for e in entries {
        if let Some(tags) = &e.tags {
            for tag in tags {
                *freq.entry(tag.clone()).or_insert(0) += 1;
            }
        }
    }
    freq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::parse_filter;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn sample_entry(title: &str, tags: Vec<&str>) -> ProjectedEntry {
        ProjectedEntry {
            id: "arch-1".to_string(),
            title: title.to_string(),
            topic: "architecture".to_string(),
            confidence: 0.85,
            fresh: true,
            summary: "summary text".to_string(),
            references: None,
            tags: Some(tags.into_iter().map(String::from).collect::<BTreeSet<_>>()),
            content: Some("full content body".to_string()),
            sources: None,
            git_sha: None,
            last_accessed: Utc::now(),
            score: 1.0,
        }
    }

    #[test]
    fn merged_body_renders_each_entry() {
        let entries = vec![sample_entry("Alpha", vec!["a"]), sample_entry("Beta", vec!["b"])];
        let body = merged_body(&entries);
        assert!(body.contains("Alpha"));
        assert!(body.contains("Beta"));
        assert!(body.contains("full content body"));
    }

    #[test]
    fn empty_entries_say_no_matches() {
        assert_eq!(merged_body(&[]), "No matching entries.");
    }

    #[test]
    fn footer_lists_top_tags_and_mode() {
        let entries = vec![
            sample_entry("Alpha", vec!["common", "rare-a"]),
            sample_entry("Beta", vec!["common", "rare-b"]),
        ];
        let freq = tag_frequencies(&entries);
        let filter = parse_filter("#common");
        let mode = crate::analyzer::filter_mode(&filter);
        let footer = query_footer(mode, &freq);
        assert!(footer.contains("tag-only"));
        assert!(footer.contains("common"));
    }

    #[test]
    fn conflict_and_stale_blocks_absent_when_empty() {
        assert!(conflict_block(&[]).is_none());
        assert!(stale_block(&[]).is_none());
    }
}
