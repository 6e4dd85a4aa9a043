//! Thin stdio JSON-RPC transport shim, grounded on the teacher's
//! `core/src/main.rs` `run_mcp()` loop. Owns only (de)serialization and
//! dispatch to the eight named tools (§6); all business logic lives in
//! [`crate::coordinator::Coordinator`].

use crate::coordinator::Coordinator;
use crate::entry::{Topic, Trust};
use crate::normalize;
use crate::store::{CorrectAction, Detail};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "memlobe";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const TOOL_NAMES: &[&str] = &[
    "memory_store",
    "memory_query",
    "memory_correct",
    "memory_context",
    "memory_bootstrap",
    "memory_diagnose",
    "memory_list_lobes",
    "memory_stats",
];

pub fn run_mcp(coordinator: &Coordinator) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let id = msg.get("id").cloned();
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");

        let reply = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": msg.get("params").and_then(|p| p.get("protocolVersion")).cloned().unwrap_or(json!(PROTOCOL_VERSION)),
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                }
            }),
            "tools/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": tool_list() }
            }),
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(json!({}));
                let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(json!({}));
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": dispatch(coordinator, name, &args),
                })
            }
            _ => continue,
        };

        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    Ok(())
}

fn tool_list() -> Value {
    json!(TOOL_NAMES
        .iter()
        .map(|name| json!({ "name": name, "inputSchema": { "type": "object" } }))
        .collect::<Vec<_>>())
}

fn text_result(text: impl Into<String>, is_error: bool) -> Value {
    json!({ "content": [{"type": "text", "text": text.into()}], "isError": is_error })
}

fn dispatch(coordinator: &Coordinator, name: &str, args: &Value) -> Value {
    match name {
        "memory_store" => handle_store(coordinator, args),
        "memory_query" => handle_query(coordinator, args),
        "memory_correct" => handle_correct(coordinator, args),
        "memory_context" => handle_context(coordinator, args),
        "memory_bootstrap" => handle_bootstrap(coordinator, args),
        "memory_diagnose" => handle_diagnose(coordinator, args),
        "memory_list_lobes" => handle_list_lobes(coordinator),
        "memory_stats" => handle_stats(coordinator, args),
        other => text_result(format!("Tool not found: {other}"), true),
    }
}

fn str_field<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn str_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Collect the string-valued top-level fields into a map and run them
/// through the normalizer's alias resolution (4.G), so `tools/call`
/// arguments see the same canonical names regardless of which alias the
/// caller used.
fn canonical_args(args: &Value, is_store: bool) -> HashMap<String, String> {
    let Some(obj) = args.as_object() else {
        return HashMap::new();
    };
    let raw: HashMap<String, String> = obj
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    normalize::resolve_aliases(raw, is_store)
}

fn handle_store(coordinator: &Coordinator, args: &Value) -> Value {
    let canonical = canonical_args(args, true);

    let Some(topic_raw) = canonical.get("topic") else {
        return text_result("memory_store requires `topic`.", true);
    };
    let topic_str = normalize::normalize_wildcard(topic_raw);
    let Some(topic) = Topic::parse(&topic_str) else {
        return text_result(format!("Invalid topic '{topic_str}'."), true);
    };

    let Some(title) = canonical.get("title") else {
        return text_result("memory_store requires `title`.", true);
    };
    let Some(content) = canonical.get("content") else {
        return text_result("memory_store requires `content`.", true);
    };

    let lobe = canonical.get("lobe").cloned();
    let trust = match str_field(args, "trust") {
        None => None,
        Some(raw) => match Trust::parse(raw) {
            Some(t) => Some(t),
            None => return text_result(format!("Invalid trust '{raw}'."), true),
        },
    };
    let tags: BTreeSet<String> = str_list(args, "tags").into_iter().collect();
    let sources = str_list(args, "sources");
    let references = canonical
        .get("references")
        .map(|r| vec![r.clone()])
        .unwrap_or_else(|| str_list(args, "references"));
    let branch = str_field(args, "branch").map(String::from);
    let git_sha = str_field(args, "gitSha").map(String::from);

    match coordinator.store(
        lobe.as_deref(),
        topic,
        &title,
        &content,
        sources,
        references,
        trust,
        tags,
        branch,
        git_sha,
    ) {
        Ok(result) => json!({
            "content": [{
                "type": "text",
                "text": format!(
                    "stored={} id={:?} confidence={:?} warning={:?} ephemeralWarning={:?}",
                    result.stored, result.id, result.confidence, result.warning, result.ephemeral_warning
                )
            }],
            "isError": !result.stored,
        }),
        Err(e) => text_result(e.to_string(), true),
    }
}

fn parse_detail(args: &Value) -> Detail {
    match str_field(args, "detail") {
        Some("full") => Detail::Full,
        Some("standard") => Detail::Standard,
        _ => Detail::Brief,
    }
}

fn handle_query(coordinator: &Coordinator, args: &Value) -> Value {
    let canonical = canonical_args(args, false);
    let lobe = canonical.get("lobe").cloned();
    let filter = canonical.get("filter").cloned();
    let scope = normalize::default_query_scope(str_field(args, "scope").map(String::from), filter.as_deref())
        .map(|s| normalize::normalize_wildcard(&s))
        .unwrap_or_else(|| "*".to_string());
    let branch = str_field(args, "branch").map(|b| normalize::normalize_wildcard(b));
    let detail = parse_detail(args);

    match coordinator.query(lobe.as_deref(), &scope, detail, filter.as_deref(), branch.as_deref()) {
        Ok((result, labels)) => {
            let body = crate::format::merged_body(&result.entries);
            let tag_freq = crate::format::tag_frequencies(&result.entries);
            let parsed = crate::analyzer::parse_filter(filter.as_deref().unwrap_or(""));
            let mode = crate::analyzer::filter_mode(&parsed);
            let footer = crate::format::query_footer(mode, &tag_freq);
            let conflicts = crate::format::conflict_block(&result.conflicts);

            let mut text = format!("lobes: {}\n\n{body}\n\n{footer}", labels.join(", "));
            if let Some(c) = conflicts {
                text.push_str(&format!("\n\n{c}"));
            }
            text_result(text, false)
        }
        Err(e) => text_result(e.to_string(), true),
    }
}

fn handle_correct(coordinator: &Coordinator, args: &Value) -> Value {
    let Some(id) = str_field(args, "id") else {
        return text_result("memory_correct requires `id`.", true);
    };
    let action = match str_field(args, "action") {
        Some("delete") => CorrectAction::Delete,
        Some("replace") => CorrectAction::Replace,
        Some("append") | None => CorrectAction::Append,
        Some(other) => return text_result(format!("Invalid action '{other}'."), true),
    };
    let correction = str_field(args, "correction").unwrap_or("");
    let lobe = canonical_args(args, false).get("lobe").cloned();

    match coordinator.correct(lobe.as_deref(), id, correction, action) {
        Ok(result) => json!({
            "content": [{
                "type": "text",
                "text": format!(
                    "corrected={} newConfidence={:?} trust={:?} error={:?}",
                    result.corrected, result.new_confidence, result.trust, result.error
                )
            }],
            "isError": !result.corrected,
        }),
        Err(e) => text_result(e.to_string(), true),
    }
}

fn handle_context(coordinator: &Coordinator, args: &Value) -> Value {
    let canonical = canonical_args(args, false);
    let lobe = canonical.get("lobe").cloned();
    let context = canonical.get("context").cloned();
    let max = args.get("maxResults").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
    let min_match = args.get("minMatch").and_then(|v| v.as_f64()).unwrap_or(0.2);
    let reference_filter = str_field(args, "referenceFilter");

    match context {
        None => match coordinator.briefing(lobe.as_deref()) {
            Ok(briefing) => text_result(briefing.summary, false),
            Err(e) => text_result(e.to_string(), true),
        },
        Some(context) => match coordinator.context_search(lobe.as_deref(), &context, max, reference_filter, min_match) {
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .map(|h| format!("- [{}] {} (score {:.2})", h.topic, h.title, h.score))
                    .collect();
                text_result(lines.join("\n"), false)
            }
            Err(e) => text_result(e.to_string(), true),
        },
    }
}

fn handle_bootstrap(coordinator: &Coordinator, args: &Value) -> Value {
    let lobe = canonical_args(args, false).get("lobe").cloned();
    let root = str_field(args, "root").map(std::path::PathBuf::from);
    let budget_mb = args.get("budgetMB").and_then(|v| v.as_u64()).unwrap_or(100);

    let lobe_name = match (&lobe, &root) {
        (Some(name), Some(root)) => {
            coordinator.create_lobe(name, root.clone(), budget_mb);
            name.clone()
        }
        (Some(name), None) => name.clone(),
        (None, Some(root)) => {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "bootstrapped".to_string());
            coordinator.create_lobe(&name, root.clone(), budget_mb);
            name
        }
        (None, None) => return text_result("memory_bootstrap requires `lobe` or `root`.", true),
    };

    let Some((root, _, _)) = coordinator.lobe_info(&lobe_name) else {
        return text_result(format!("Unknown lobe '{lobe_name}'."), true);
    };
    let seeds = crate::bootstrap::scan_repo_for_seeds(&root);
    match coordinator.bootstrap(&lobe_name, seeds) {
        Ok(results) => text_result(format!("bootstrapped {} seeds into '{lobe_name}'", results.len()), false),
        Err(e) => text_result(e.to_string(), true),
    }
}

fn handle_diagnose(coordinator: &Coordinator, args: &Value) -> Value {
    let show_history = args.get("showCrashHistory").and_then(|v| v.as_bool()).unwrap_or(false);
    let mode = format!("{:?}", coordinator.server_mode());
    let mut text = format!("mode: {mode}\nconfig origin: {}\n", coordinator.config_origin_label());

    if show_history {
        let history = crate::crash::read_crash_history(10);
        if history.is_empty() {
            text.push_str("no crash history\n");
        } else {
            for report in &history {
                text.push_str(&crate::crash::format_summary(report));
                text.push('\n');
            }
        }
    }
    text_result(text, false)
}

fn handle_list_lobes(coordinator: &Coordinator) -> Value {
    let mode = format!("{:?}", coordinator.server_mode());
    let names = coordinator.lobe_names();
    let mut text = format!("mode: {mode}\nconfig origin: {}\nlobes:\n", coordinator.config_origin_label());
    for name in &names {
        let health = coordinator.lobe_health(name).map(|h| format!("{h:?}")).unwrap_or_default();
        text.push_str(&format!("- {name}: {health}\n"));
    }
    text_result(text, false)
}

fn handle_stats(coordinator: &Coordinator, args: &Value) -> Value {
    let lobe = canonical_args(args, false).get("lobe").cloned();
    match coordinator.stats(lobe.as_deref()) {
        Ok(stats) => {
            let mut text = String::new();
            for (name, s) in &stats {
                text.push_str(&format!(
                    "{name}: {} entries, {} bytes / {} budget, {} corrupt\n",
                    s.total_entries, s.storage_size, s.storage_budget_bytes, s.corrupt_files
                ));
            }
            text_result(text, false)
        }
        Err(e) => text_result(e.to_string(), true),
    }
}
