//! Text Analyzer (component A) — pure functions only.
//!
//! Stemming, keyword extraction, Jaccard/containment/hybrid similarity, the
//! filter language, and relevance scoring. No I/O, no clock, no state.

use std::collections::BTreeSet;

/// Fixed English stopword list (glossary). Kept as a sorted slice so lookup
/// is a binary search rather than a hash allocation per call.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "before", "being", "both", "but", "by", "can", "could", "did", "do",
    "does", "during", "each", "either", "every", "few", "for", "from", "had", "has", "have",
    "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just",
    "may", "me", "might", "more", "most", "my", "neither", "no", "nor", "not", "of", "on",
    "only", "or", "other", "our", "out", "own", "same", "shall", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "them", "then", "these", "they", "this",
    "those", "through", "to", "too", "up", "use", "used", "using", "very", "was", "we",
    "were", "what", "when", "where", "which", "who", "whom", "will", "with", "would", "yet",
    "you", "your",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

// ─────────────────────────────────────────────────────────────────────────
// Stemming
// ─────────────────────────────────────────────────────────────────────────

/// Deterministic suffix-stripping cascade. Words of length <=4 are returned
/// unchanged (spec invariant 4). Order is a contract — first match wins.
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.chars().count() <= 4 {
        return lower;
    }

    if let Some(s) = strip_suffix(&lower, "ations") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "tion") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ment") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ness") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ings") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ally") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ing") {
        return s.to_string();
    }
    if let Some(s) = strip_suffix(&lower, "ies") {
        return format!("{s}y");
    }
    if let Some(s) = strip_suffix(&lower, "ers") {
        return format!("{s}er");
    }
    if let Some(s) = strip_suffix(&lower, "ted") {
        return format!("{s}t");
    }
    if char_len(&lower) > 4 {
        if let Some(s) = strip_suffix(&lower, "es") {
            return s.to_string();
        }
    }
    if char_len(&lower) > 4 {
        if let Some(s) = strip_suffix(&lower, "ed") {
            return s.to_string();
        }
    }
    if char_len(&lower) > 4 {
        if let Some(s) = strip_suffix(&lower, "ly") {
            return s.to_string();
        }
    }
    if char_len(&lower) > 4 && !lower.ends_with("ss") {
        if let Some(s) = strip_suffix(&lower, "s") {
            return s.to_string();
        }
    }

    lower
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Strip `suffix` from `word` iff present; the remainder must be non-empty.
fn strip_suffix<'a>(word: &'a str, suffix: &str) -> Option<&'a str> {
    word.strip_suffix(suffix).filter(|s| !s.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────
// Keyword extraction
// ─────────────────────────────────────────────────────────────────────────

/// Lowercase, replace non `[a-z0-9 _-]` with space, split on whitespace,
/// drop len<=2 tokens and stopwords, expand hyphenated compounds, stem.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    for token in cleaned.split_whitespace() {
        add_keyword_token(&mut out, token);
        if token.contains('-') {
            for part in token.split('-') {
                add_keyword_token(&mut out, part);
            }
        }
    }
    out
}

fn add_keyword_token(out: &mut BTreeSet<String>, token: &str) {
    if token.chars().count() <= 2 {
        return;
    }
    if is_stopword(token) {
        return;
    }
    out.insert(stem(token));
}

// ─────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

pub fn containment(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let denom = a.len().min(b.len());
    inter as f64 / denom as f64
}

/// Title-weighted keyword set: `(title, title, content)` concatenated so the
/// title's vocabulary counts twice before deduplication into the set.
pub fn weighted_keywords(title: &str, content: &str) -> BTreeSet<String> {
    extract_keywords(&format!("{title} {title} {content}"))
}

/// `max(jaccard, containment)` over title-weighted keyword sets of both sides.
pub fn hybrid_similarity(title_a: &str, content_a: &str, title_b: &str, content_b: &str) -> f64 {
    let a = weighted_keywords(title_a, content_a);
    let b = weighted_keywords(title_b, content_b);
    jaccard(&a, &b).max(containment(&a, &b))
}

// ─────────────────────────────────────────────────────────────────────────
// Filter language
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGroup {
    pub must: BTreeSet<String>,
    pub must_exact: BTreeSet<String>,
    pub must_tags: BTreeSet<String>,
    pub must_not: BTreeSet<String>,
}

impl FilterGroup {
    fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.must_exact.is_empty()
            && self.must_tags.is_empty()
            && self.must_not.is_empty()
    }

    fn term_count(&self) -> usize {
        self.must.len() + self.must_exact.len() + self.must_tags.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilter {
    pub groups: Vec<FilterGroup>,
}

impl ParsedFilter {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() || self.groups.iter().all(FilterGroup::is_empty)
    }
}

/// Parse a filter string into OR-groups of AND-terms.
///
/// `-term` excludes (stemmed, no hyphen expansion); `#tag` is an exact tag
/// match; `=term` is an exact keyword match; plain terms go through full
/// keyword extraction (hyphen expansion included).
pub fn parse_filter(raw: &str) -> ParsedFilter {
    let raw = raw.trim();
    if raw.is_empty() {
        return ParsedFilter::default();
    }

    let mut groups = Vec::new();
    for or_group in raw.split('|') {
        let mut group = FilterGroup::default();
        for term in or_group.split_whitespace() {
            if let Some(rest) = term.strip_prefix('-') {
                if rest.is_empty() {
                    continue;
                }
                group.must_not.insert(stem(&rest.to_lowercase()));
            } else if let Some(rest) = term.strip_prefix('#') {
                if rest.is_empty() {
                    continue;
                }
                group.must_tags.insert(rest.to_lowercase());
            } else if let Some(rest) = term.strip_prefix('=') {
                if rest.is_empty() {
                    continue;
                }
                group.must_exact.insert(rest.to_lowercase());
            } else {
                for kw in extract_keywords(term) {
                    group.must.insert(kw);
                }
            }
        }
        groups.push(group);
    }

    ParsedFilter { groups }
}

/// A query mode, echoed in the footer (component F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    NoFilter,
    TagOnly,
    KeywordOnly,
    Complex {
        has_tags: bool,
        has_exact: bool,
        has_not: bool,
        has_or: bool,
    },
}

pub fn filter_mode(filter: &ParsedFilter) -> FilterMode {
    if filter.is_empty() {
        return FilterMode::NoFilter;
    }

    let has_or = filter.groups.len() > 1;
    let has_tags = filter.groups.iter().any(|g| !g.must_tags.is_empty());
    let has_exact = filter.groups.iter().any(|g| !g.must_exact.is_empty());
    let has_not = filter.groups.iter().any(|g| !g.must_not.is_empty());
    let has_plain = filter.groups.iter().any(|g| !g.must.is_empty());

    if has_or || has_exact || has_not || (has_tags && has_plain) {
        return FilterMode::Complex {
            has_tags,
            has_exact,
            has_not,
            has_or,
        };
    }
    if has_tags {
        return FilterMode::TagOnly;
    }
    FilterMode::KeywordOnly
}

/// What a matchable entry looks like to the analyzer — just enough surface
/// to filter/score without depending on the entry/store module.
pub struct Matchable<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub tags: &'a BTreeSet<String>,
}

fn group_matches(group: &FilterGroup, all_keywords: &BTreeSet<String>, tags: &BTreeSet<String>) -> bool {
    if group.is_empty() {
        return false;
    }
    if group.must.iter().any(|t| !all_keywords.contains(t)) {
        return false;
    }
    if group.must_exact.iter().any(|t| !all_keywords.contains(t)) {
        return false;
    }
    if group.must_tags.iter().any(|t| !tags.contains(t)) {
        return false;
    }
    if group.must_not.iter().any(|t| all_keywords.contains(t)) {
        return false;
    }
    true
}

/// An entry matches a filter iff any OR-group is fully satisfied. An empty
/// filter matches everything (invariant 6).
pub fn matches_filter(entry: &Matchable, filter: &ParsedFilter) -> bool {
    if filter.is_empty() {
        return true;
    }
    let all_keywords = extract_keywords(&format!("{} {}", entry.title, entry.content));
    filter
        .groups
        .iter()
        .any(|g| group_matches(g, &all_keywords, entry.tags))
}

/// Relevance score: best-matching OR-group's hit ratio, times confidence.
/// 2.0 per must/must_exact/must_tags term found in title keywords or tags,
/// 1.0 if found only in content; divided by group size; 0 for no match.
pub fn relevance_score(entry: &Matchable, filter: &ParsedFilter, confidence: f64) -> f64 {
    if filter.is_empty() {
        return confidence;
    }

    let title_keywords = extract_keywords(entry.title);
    let all_keywords = extract_keywords(&format!("{} {}", entry.title, entry.content));

    let mut best = 0.0_f64;
    for group in &filter.groups {
        let n = group.term_count();
        if n == 0 {
            continue;
        }
        if !group_matches(group, &all_keywords, entry.tags) {
            continue;
        }

        let mut hits = 0.0_f64;
        for term in group.must.iter().chain(group.must_exact.iter()) {
            if title_keywords.contains(term) {
                hits += 2.0;
            } else {
                hits += 1.0;
            }
        }
        for tag in &group.must_tags {
            if entry.tags.contains(tag) {
                hits += 2.0;
            }
        }

        let score = hits / n as f64;
        if score > best {
            best = score;
        }
    }

    best * confidence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_words_unchanged() {
        for w in ["is", "cat", "they", "that"] {
            assert_eq!(stem(w), w.to_lowercase());
        }
    }

    #[test]
    fn contract_stem_mappings() {
        assert_eq!(stem("reducers"), "reducer");
        assert_eq!(stem("implementations"), "implement");
        assert_eq!(stem("handling"), "handl");
        assert_eq!(stem("sealed"), "seal");
    }

    #[test]
    fn stem_ordering_tion_before_s() {
        // "tion" must win before the generic "s" stripping rule would apply.
        assert_eq!(stem("migrations"), "migr");
    }

    #[test]
    fn jaccard_self_is_one() {
        let a = extract_keywords("architecture pattern reducers");
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn containment_at_least_jaccard() {
        let a = extract_keywords("architecture pattern");
        let b = extract_keywords("architecture pattern reducers viewmodels state");
        assert!(containment(&a, &b) >= jaccard(&a, &b));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = parse_filter("");
        let tags = BTreeSet::new();
        let m = Matchable {
            title: "anything",
            content: "at all",
            tags: &tags,
        };
        assert!(matches_filter(&m, &filter));
    }

    #[test]
    fn stemming_filter_scenario() {
        // spec §8 scenario 3
        let parsed = parse_filter("reducer sealed|MVI -deprecated");
        assert_eq!(parsed.groups.len(), 2);
        assert_eq!(
            parsed.groups[0].must,
            BTreeSet::from(["reducer".to_string(), "seal".to_string()])
        );
        assert!(parsed.groups[0].must_not.is_empty());
        assert_eq!(parsed.groups[1].must, BTreeSet::from(["mvi".to_string()]));
        assert_eq!(
            parsed.groups[1].must_not,
            BTreeSet::from(["deprecat".to_string()])
        );
    }

    #[test]
    fn tag_and_exact_terms_are_not_stemmed() {
        let parsed = parse_filter("#Architecture =Reducers");
        assert_eq!(
            parsed.groups[0].must_tags,
            BTreeSet::from(["architecture".to_string()])
        );
        assert_eq!(
            parsed.groups[0].must_exact,
            BTreeSet::from(["reducers".to_string()])
        );
    }
}
