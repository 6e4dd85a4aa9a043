//! The Entry data model (§3): fields, on-disk markdown format, and the
//! parse/serialize round trip (invariant 1 in §8's round-trip laws).

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trust {
    User,
    AgentConfirmed,
    AgentInferred,
}

impl Trust {
    pub fn confidence(self) -> f64 {
        match self {
            Trust::User => 1.0,
            Trust::AgentConfirmed => 0.85,
            Trust::AgentInferred => 0.70,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trust::User => "user",
            Trust::AgentConfirmed => "agent-confirmed",
            Trust::AgentInferred => "agent-inferred",
        }
    }

    pub fn parse(s: &str) -> Option<Trust> {
        match s {
            "user" => Some(Trust::User),
            "agent-confirmed" => Some(Trust::AgentConfirmed),
            "agent-inferred" => Some(Trust::AgentInferred),
            _ => None,
        }
    }
}

impl Default for Trust {
    fn default() -> Self {
        Trust::AgentInferred
    }
}

impl fmt::Display for Trust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed topic set, plus the open `modules/<name>` namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    User,
    Preferences,
    Architecture,
    Conventions,
    Gotchas,
    RecentWork,
    Module(String),
}

impl Topic {
    pub fn as_string(&self) -> String {
        match self {
            Topic::User => "user".to_string(),
            Topic::Preferences => "preferences".to_string(),
            Topic::Architecture => "architecture".to_string(),
            Topic::Conventions => "conventions".to_string(),
            Topic::Gotchas => "gotchas".to_string(),
            Topic::RecentWork => "recent-work".to_string(),
            Topic::Module(name) => format!("modules/{name}"),
        }
    }

    /// Parse a topic string. Returns `None` for anything illegal —
    /// per invariant 4, such a file is corrupt, not merely unsupported.
    pub fn parse(s: &str) -> Option<Topic> {
        match s {
            "user" => Some(Topic::User),
            "preferences" => Some(Topic::Preferences),
            "architecture" => Some(Topic::Architecture),
            "conventions" => Some(Topic::Conventions),
            "gotchas" => Some(Topic::Gotchas),
            "recent-work" => Some(Topic::RecentWork),
            s => s
                .strip_prefix("modules/")
                .filter(|name| !name.is_empty())
                .map(|name| Topic::Module(name.to_string())),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Topic::User | Topic::Preferences)
    }

    pub fn is_recent_work(&self) -> bool {
        matches!(self, Topic::RecentWork)
    }

    /// Id prefix per §3's table.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Topic::User => "user",
            Topic::Preferences => "pref",
            Topic::Architecture => "arch",
            Topic::Conventions => "conv",
            Topic::Gotchas => "gotcha",
            Topic::RecentWork => "recent",
            Topic::Module(_) => "mod",
        }
    }

    /// Directory the topic's files live under, relative to a memory root.
    pub fn dir_name(&self) -> String {
        match self {
            Topic::Module(name) => format!("modules/{name}"),
            other => other.as_string(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub topic: Topic,
    pub title: String,
    pub content: String,
    pub sources: Vec<String>,
    pub references: Vec<String>,
    pub tags: BTreeSet<String>,
    pub trust: Trust,
    pub confidence: f64,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub branch: Option<String>,
    pub git_sha: Option<String>,
    /// True when this entry's on-disk confidence was out of range and had
    /// to be clamped on load (invariant 3; not part of the on-disk format).
    pub corrected: bool,
}

impl Entry {
    pub fn clamp_confidence(&mut self) {
        let clamped = self.confidence.clamp(0.0, 1.0);
        if (clamped - self.confidence).abs() > f64::EPSILON {
            self.corrected = true;
        }
        self.confidence = clamped;
    }

    /// Sanitize a branch name for use as a directory segment (invariant 6):
    /// path separators become `-`.
    pub fn sanitize_branch(branch: &str) -> String {
        branch.replace(['/', '\\'], "-")
    }

    pub fn filename(&self) -> String {
        format!("{}.md", self.id)
    }

    /// Render the on-disk markdown document (§3).
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n", self.title));
        out.push_str(&format!("- **id**: {}\n", self.id));
        out.push_str(&format!("- **topic**: {}\n", self.topic));
        out.push_str(&format!("- **confidence**: {}\n", self.confidence));
        out.push_str(&format!("- **trust**: {}\n", self.trust));
        out.push_str(&format!("- **created**: {}\n", self.created.to_rfc3339()));
        out.push_str(&format!(
            "- **lastAccessed**: {}\n",
            self.last_accessed.to_rfc3339()
        ));
        if !self.sources.is_empty() {
            out.push_str(&format!("- **sources**: {}\n", self.sources.join(", ")));
        }
        if !self.references.is_empty() {
            out.push_str(&format!(
                "- **references**: {}\n",
                self.references.join(", ")
            ));
        }
        if !self.tags.is_empty() {
            out.push_str(&format!(
                "- **tags**: {}\n",
                self.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if let Some(branch) = &self.branch {
            out.push_str(&format!("- **branch**: {branch}\n"));
        }
        if let Some(sha) = &self.git_sha {
            out.push_str(&format!("- **gitSha**: {sha}\n"));
        }
        out.push('\n');
        out.push_str(&self.content);
        out
    }

    /// Parse a markdown document back into an `Entry`. Returns `None` when
    /// the topic is absent or illegal (corrupt file, invariant 4); other
    /// metadata lines are optional/tolerant per the on-disk format contract.
    pub fn from_markdown(id: &str, text: &str) -> Option<Entry> {
        let mut lines = text.lines();
        let title = lines
            .next()
            .and_then(|l| l.strip_prefix("# "))
            .unwrap_or("")
            .to_string();

        let mut topic = None;
        let mut confidence = 0.0_f64;
        let mut trust = Trust::AgentInferred;
        let mut created = Utc::now();
        let mut last_accessed = Utc::now();
        let mut sources = Vec::new();
        let mut references = Vec::new();
        let mut tags = BTreeSet::new();
        let mut branch = None;
        let mut git_sha = None;

        let mut content_start_found = false;
        let mut remaining = String::new();

        for line in lines.by_ref() {
            if line.trim().is_empty() {
                content_start_found = true;
                break;
            }
            let Some(field) = parse_field_line(line) else {
                continue;
            };
            match field.0 {
                "id" => {}
                "topic" => topic = Topic::parse(field.1),
                "confidence" => confidence = field.1.parse().unwrap_or(0.0),
                "trust" => trust = Trust::parse(field.1).unwrap_or_default(),
                "created" => {
                    created = DateTime::parse_from_rfc3339(field.1)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now())
                }
                "lastAccessed" => {
                    last_accessed = DateTime::parse_from_rfc3339(field.1)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now())
                }
                "sources" => sources = split_csv(field.1),
                "references" => references = split_csv(field.1),
                "tags" => tags = split_csv(field.1).into_iter().collect(),
                "branch" => branch = Some(field.1.to_string()),
                "gitSha" => git_sha = Some(field.1.to_string()),
                _ => {}
            }
        }

        let topic = topic?;

        if content_start_found {
            remaining = lines.collect::<Vec<_>>().join("\n");
        }

        let mut entry = Entry {
            id: id.to_string(),
            topic,
            title,
            content: remaining,
            sources,
            references,
            tags,
            trust,
            confidence,
            created,
            last_accessed,
            branch,
            git_sha,
            corrected: false,
        };
        entry.clamp_confidence();
        Some(entry)
    }
}

fn parse_field_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start_matches('-').trim();
    let rest = line.strip_prefix("**")?;
    let (key, rest) = rest.split_once("**:")?;
    Some((key, rest.trim()))
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        let mut e = Entry {
            id: "arch-deadbeef".into(),
            topic: Topic::Architecture,
            title: "Sample".into(),
            content: "Line one.\n\nLine two, with a blank line above.".into(),
            sources: vec!["src/a.rs".into()],
            references: vec!["Foo::bar".into()],
            tags: BTreeSet::from(["tag-a".to_string(), "tag-b".to_string()]),
            trust: Trust::User,
            confidence: Trust::User.confidence(),
            created: Utc::now(),
            last_accessed: Utc::now(),
            branch: None,
            git_sha: Some("abc123".into()),
            corrected: false,
        };
        e.clamp_confidence();
        e
    }

    #[test]
    fn round_trip_preserves_fields() {
        let entry = sample_entry();
        let md = entry.to_markdown();
        let parsed = Entry::from_markdown(&entry.id, &md).expect("must parse");

        assert_eq!(parsed.title, entry.title);
        assert_eq!(parsed.topic, entry.topic);
        assert_eq!(parsed.content, entry.content);
        assert_eq!(parsed.sources, entry.sources);
        assert_eq!(parsed.references, entry.references);
        assert_eq!(parsed.tags, entry.tags);
        assert_eq!(parsed.trust, entry.trust);
        assert!((parsed.confidence - entry.confidence).abs() < 1e-9);
        assert_eq!(parsed.git_sha, entry.git_sha);
    }

    #[test]
    fn out_of_range_confidence_is_clamped_and_flagged_corrected() {
        let mut entry = sample_entry();
        entry.confidence = 1.4;
        entry.corrected = false;
        let md = entry.to_markdown();
        let parsed = Entry::from_markdown(&entry.id, &md).expect("must parse");
        assert_eq!(parsed.confidence, 1.0);
        assert!(parsed.corrected);
    }

    #[test]
    fn illegal_topic_is_corrupt() {
        let text = "# Title\n- **id**: x-1\n- **topic**: not-a-real-topic\n- **confidence**: 1.0\n- **trust**: user\n- **created**: 2024-01-01T00:00:00Z\n- **lastAccessed**: 2024-01-01T00:00:00Z\n\nBody";
        assert!(Entry::from_markdown("x-1", text).is_none());
    }

    #[test]
    fn missing_optional_lines_still_parse() {
        let text = "# Minimal\n- **id**: conv-1\n- **topic**: conventions\n- **confidence**: 0.7\n- **trust**: agent-inferred\n- **created**: 2024-01-01T00:00:00Z\n- **lastAccessed**: 2024-01-01T00:00:00Z\n\nJust content.";
        let parsed = Entry::from_markdown("conv-1", text).expect("must parse");
        assert!(parsed.sources.is_empty());
        assert!(parsed.references.is_empty());
        assert!(parsed.tags.is_empty());
        assert!(parsed.branch.is_none());
    }

    #[test]
    fn module_topic_round_trips() {
        let topic = Topic::parse("modules/payments-api").unwrap();
        assert_eq!(topic, Topic::Module("payments-api".to_string()));
        assert_eq!(topic.as_string(), "modules/payments-api");
        assert_eq!(topic.dir_name(), "modules/payments-api");
    }

    #[test]
    fn branch_sanitization_replaces_separators() {
        assert_eq!(Entry::sanitize_branch("feature/foo/bar"), "feature-foo-bar");
    }
}
