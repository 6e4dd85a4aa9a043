//! Ephemerality Classifier (component B).
//!
//! Two layers: a declarative regex signal registry, and — only when the
//! registry fires nothing — a TF-IDF logistic regression fallback. Output
//! is advisory only; it never blocks a `store` (spec §4.B).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub id: &'static str,
    pub label: &'static str,
    pub detail: String,
    pub confidence: SignalConfidence,
}

struct SignalDef {
    id: &'static str,
    label: &'static str,
    confidence: SignalConfidence,
    skip_topics: &'static [&'static str],
    test: fn(lower_title: &str, lower_content: &str, title: &str, content: &str) -> Option<String>,
}

fn re_once(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static ephemerality regex must compile"))
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            re_once(&CELL, $pattern)
        }
    };
}

static_regex!(
    re_temporal,
    r"\b(currently|right now|at the moment|for now|temporarily|today|this week)\b"
);
static_regex!(
    re_fixed_bug,
    r"\b(fixed|resolved|patched)\b.*\b(bug|issue|error|crash)\b"
);
static_regex!(
    re_task_language,
    r"\b(todo|to-do|need to|should|will|next step|in progress)\b"
);
static_regex!(re_stack_trace, r"(at\s+\S+\(\S+:\d+\)|Traceback \(most recent)");
static_regex!(
    re_environment_specific,
    r"\b(localhost|127\.0\.0\.1|/home/|/users/|c:\\\\|my machine|my laptop)\b"
);
static_regex!(re_verbatim_code, r"```|^\s{4,}\S|;\s*$");
static_regex!(
    re_investigation,
    r"\b(investigating|debugging|digging into|still trying to figure out|looking into)\b"
);
static_regex!(
    re_uncertainty,
    r"\b(not sure|maybe|might be|unclear|unsure|i think|possibly)\b"
);
static_regex!(
    re_self_correction,
    r"\b(actually|correction|i was wrong|scratch that|on second thought)\b"
);
static_regex!(
    re_meeting_reference,
    r"\b(as discussed|per (our|the) (call|meeting|standup)|in (our|the) sync)\b"
);
static_regex!(
    re_pending_decision,
    r"\b(tbd|to be decided|pending decision|waiting on|need(s)? approval)\b"
);
static_regex!(re_version_pinned, r"\bv?\d+\.\d+\.\d+\b");
static_regex!(
    re_metrics_change,
    r"\b(latency|throughput|error rate|p9\d)\b.*\b(dropped|increased|decreased|improved|regressed)\b"
);

const REGISTRY: &[SignalDef] = &[
    SignalDef {
        id: "temporal",
        label: "Temporal language",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_temporal()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("contains temporal phrase \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "fixed-bug",
        label: "Already-fixed bug reference",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_fixed_bug()
                .find(&format!("{lt} {lc}"))
                .map(|_| "describes a bug that is already fixed".to_string())
        },
    },
    SignalDef {
        id: "task-language",
        label: "Task/TODO language",
        confidence: SignalConfidence::Low,
        skip_topics: &["recent-work"],
        test: |lt, lc, _t, _c| {
            re_task_language()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("contains task language \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "stack-trace",
        label: "Stack trace / traceback",
        confidence: SignalConfidence::High,
        skip_topics: &[],
        test: |_lt, _lc, _t, c| {
            re_stack_trace()
                .find(c)
                .map(|_| "contains a stack trace".to_string())
        },
    },
    SignalDef {
        id: "environment-specific",
        label: "Machine-specific detail",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_environment_specific()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("references a local path/host \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "verbatim-code",
        label: "Verbatim code block",
        confidence: SignalConfidence::Low,
        skip_topics: &[],
        test: |_lt, _lc, _t, c| {
            re_verbatim_code()
                .find(c)
                .map(|_| "contains a raw code block".to_string())
        },
    },
    SignalDef {
        id: "investigation",
        label: "In-progress investigation",
        confidence: SignalConfidence::Medium,
        skip_topics: &["recent-work"],
        test: |lt, lc, _t, _c| {
            re_investigation()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("describes an active investigation \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "uncertainty",
        label: "Hedged/uncertain language",
        confidence: SignalConfidence::Low,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_uncertainty()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("hedges with \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "self-correction",
        label: "Self-correction",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_self_correction()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("self-corrects with \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "meeting-reference",
        label: "Meeting reference",
        confidence: SignalConfidence::Low,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_meeting_reference()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("references a meeting \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "pending-decision",
        label: "Pending decision",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_pending_decision()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("marks a pending decision \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "version-pinned",
        label: "Version-pinned detail",
        confidence: SignalConfidence::Low,
        skip_topics: &[],
        test: |_lt, _lc, _t, c| {
            re_version_pinned()
                .find(c)
                .map(|m| format!("pins a specific version \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "metrics-change",
        label: "Point-in-time metrics change",
        confidence: SignalConfidence::Medium,
        skip_topics: &[],
        test: |lt, lc, _t, _c| {
            re_metrics_change()
                .find(&format!("{lt} {lc}"))
                .map(|m| format!("describes a metrics change \"{}\"", m.as_str()))
        },
    },
    SignalDef {
        id: "too-short",
        label: "Too short to be durable",
        confidence: SignalConfidence::Low,
        skip_topics: &[],
        test: |_lt, _lc, _t, c| {
            if c.trim().chars().count() < 20 {
                Some("content is under 20 characters".to_string())
            } else {
                None
            }
        },
    },
];

pub fn run_registry(topic: &str, title: &str, content: &str) -> Vec<Signal> {
    let lower_title = title.to_lowercase();
    let lower_content = content.to_lowercase();
    let mut signals = Vec::new();
    for def in REGISTRY {
        if def.skip_topics.contains(&topic) {
            continue;
        }
        if let Some(detail) = (def.test)(&lower_title, &lower_content, title, content) {
            signals.push(Signal {
                id: def.id,
                label: def.label,
                detail,
                confidence: def.confidence,
            });
        }
    }
    signals
}

// ─────────────────────────────────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────────────────────────────────

pub fn format_warning(signals: &[Signal]) -> Option<String> {
    if signals.is_empty() {
        return None;
    }

    let high_count = signals
        .iter()
        .filter(|s| s.confidence == SignalConfidence::High)
        .count();

    let phrasing = if high_count >= 2 {
        "likely contains"
    } else if high_count == 1 {
        "possibly contains"
    } else {
        "may contain"
    };

    let closer = if high_count >= 2 {
        "Consider whether this belongs in a longer-lived topic before relying on it later."
    } else if high_count == 1 {
        "Worth a second look before treating this as durable knowledge."
    } else {
        "Low risk, but keep an eye on it if it resurfaces unexpectedly."
    };

    let details: Vec<String> = signals
        .iter()
        .map(|s| format!("{} ({})", s.label, s.detail))
        .collect();

    Some(format!(
        "This entry {phrasing} ephemeral, session-specific detail: {}. {closer}",
        details.join("; ")
    ))
}

// ─────────────────────────────────────────────────────────────────────────
// TF-IDF logistic fallback
// ─────────────────────────────────────────────────────────────────────────

pub use crate::tfidf::{classify as tfidf_classify, TfidfModel};

/// Full classification pipeline: regex registry first, TF-IDF fallback only
/// when the registry found nothing and the topic is eligible.
pub fn classify(topic: &str, title: &str, content: &str, model: &TfidfModel) -> Option<String> {
    let signals = run_registry(topic, title, content);
    if !signals.is_empty() {
        return format_warning(&signals);
    }

    if topic == "recent-work" || topic == "user" {
        return None;
    }

    tfidf_classify(model, topic, title, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporal_signal_fires_on_build_broken() {
        let signals = run_registry("gotchas", "Build Issue", "The build is currently broken and nobody knows why.");
        assert!(signals.iter().any(|s| s.id == "temporal"));
        let warning = format_warning(&signals).unwrap();
        assert!(warning.contains("Temporal language"));
    }

    #[test]
    fn architecture_entry_has_no_warning() {
        let signals = run_registry(
            "architecture",
            "MVI Pattern",
            "The messaging feature uses MVI with a single reducer and immutable state snapshots.",
        );
        assert!(signals.is_empty(), "unexpected signals: {signals:?}");
    }

    #[test]
    fn recent_work_skips_task_language_and_investigation() {
        let signals = run_registry(
            "recent-work",
            "Current Investigation",
            "Currently debugging the flaky CI job on the payments pipeline.",
        );
        // "currently" still fires the generic temporal signal, but
        // task-language/investigation (topic-skipped) must not appear.
        assert!(!signals.iter().any(|s| s.id == "task-language"));
        assert!(!signals.iter().any(|s| s.id == "investigation"));
    }
}
