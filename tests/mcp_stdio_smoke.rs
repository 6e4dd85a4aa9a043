use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

#[test]
fn mcp_stdio_smoke() {
    let bin = env!("CARGO_BIN_EXE_memlobe");
    let dir = tempfile::TempDir::new().unwrap();
    let lobe_root = dir.path().join("repo");
    std::fs::create_dir_all(&lobe_root).unwrap();
    let cfg_path = dir.path().join("memory-config.json");
    std::fs::write(
        &cfg_path,
        format!(r#"{{"lobes": {{"repo": {{"root": "{}", "budgetMB": 50}}}}}}"#, lobe_root.display()),
    )
    .unwrap();

    let mut child = Command::new(bin)
        .arg("--config")
        .arg(&cfg_path)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn memlobe serve");

    {
        let stdin = child.stdin.as_mut().expect("child stdin");

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": { "protocolVersion": "2024-11-05" }
            })
        )
        .unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/list"
            })
        )
        .unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {
                    "name": "memory_store",
                    "arguments": {
                        "topic": "architecture",
                        "title": "Smoke Test Entry",
                        "content": "This entry is written by the stdio smoke test.",
                        "lobe": "repo"
                    }
                }
            })
        )
        .unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {
                    "name": "memory_query",
                    "arguments": { "scope": "architecture", "lobe": "repo" }
                }
            })
        )
        .unwrap();
    }
    child.stdin.take();

    let stdout = BufReader::new(child.stdout.take().expect("child stdout"));
    let lines: Vec<String> = stdout.lines().map(|l| l.unwrap()).collect();
    child.kill().ok();
    child.wait().ok();

    assert_eq!(lines.len(), 4, "expected one reply per request, got: {lines:?}");

    let init: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(init["result"]["serverInfo"]["name"], "memlobe");

    let list: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    let tools = list["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "memory_store"));
    assert!(tools.iter().any(|t| t["name"] == "memory_query"));

    let store_reply: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(store_reply["result"]["isError"], false);

    let query_reply: serde_json::Value = serde_json::from_str(&lines[3]).unwrap();
    let text = query_reply["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Smoke Test Entry"));
}
