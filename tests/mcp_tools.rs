//! Integration tests for the MCP tool surface via `dispatch_jsonrpc()`.
//!
//! Each test builds an `Engine` over the `basic` fixture project (backed by a
//! stub embedding server, see `helpers::mod`), scans it, then sends JSON-RPC
//! requests and checks the responses.

mod helpers;

use helpers::TestHarness;
use serde_json::json;

#[test]
fn test_initialize() {
    let h = TestHarness::from_fixture("basic");
    let resp = h.initialize();

    let version = resp["result"]["protocolVersion"].as_str().unwrap();
    assert_eq!(version, "2025-06-18");

    let name = resp["result"]["serverInfo"]["name"].as_str().unwrap();
    assert_eq!(name, "file-compass");
    assert!(resp["result"]["capabilities"]["tools"].is_object());
}

#[test]
fn test_tools_list_advertises_all_five_tools() {
    let h = TestHarness::from_fixture("basic");
    let msg = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });
    let rt = tokio::runtime::Runtime::new().unwrap();
    let resp = rt.block_on(filecompass::mcp::dispatch_jsonrpc(&h.engine, &msg)).unwrap();
    let names: Vec<&str> = resp["result"]["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in ["fc_search", "fc_preview", "fc_status", "fc_scan", "fc_quick_search"] {
        assert!(names.contains(&expected), "missing tool {expected} in {names:?}");
    }
}

#[test]
fn test_fc_status_reports_fixture_files() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_status", json!({}));
    assert!(!is_err, "fc_status errored: {text}");
    let status: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(status["files_indexed"], 3);
    assert!(status["chunks_indexed"].as_u64().unwrap() > 0);
}

#[test]
fn test_fc_quick_search_finds_by_filename() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_quick_search", json!({ "query": "config.py" }));
    assert!(!is_err, "fc_quick_search errored: {text}");
    let results: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert!(results.iter().any(|r| r["relative_path"].as_str().unwrap().ends_with("config.py")));
}

#[test]
fn test_fc_quick_search_finds_by_symbol() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_quick_search", json!({ "query": "greet" }));
    assert!(!is_err, "fc_quick_search errored: {text}");
    let results: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert!(results.iter().any(|r| r["name"].as_str() == Some("greet")));
}

#[test]
fn test_fc_quick_search_respects_file_type_filter() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_quick_search", json!({ "query": "readme", "file_types": ["markdown"] }));
    assert!(!is_err, "fc_quick_search errored: {text}");
    let results: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert!(!results.is_empty(), "expected README.md to match");
    assert!(results.iter().all(|r| r["relative_path"].as_str().unwrap().ends_with(".md")));
}

#[test]
fn test_fc_search_returns_ranked_results() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_search", json!({ "query": "say hello to someone" }));
    assert!(!is_err, "fc_search errored: {text}");
    let results: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert!(!results.is_empty(), "expected at least one search result");
    assert!(results[0]["relevance"].as_f64().unwrap() >= 0.0);
    assert!(results[0]["reasons"].as_array().unwrap().iter().any(|r| r["reason_type"] == "semantic"));
}

#[test]
fn test_fc_search_rejects_empty_query() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_search", json!({ "query": "" }));
    assert!(is_err, "expected an error for an empty query: {text}");
}

#[test]
fn test_fc_preview_reads_line_range() {
    let h = TestHarness::from_fixture("basic");
    let path = h.root_path().join("src/main.py");
    let (text, is_err) = h.call_tool("fc_preview", json!({ "path": path.to_string_lossy(), "line_start": 1, "line_end": 2 }));
    assert!(!is_err, "fc_preview errored: {text}");
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(parsed["content"].as_str().unwrap().contains("def greet"));
}

#[test]
fn test_fc_preview_rejects_path_outside_roots() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_preview", json!({ "path": "/etc/hostname" }));
    assert!(is_err, "expected an error for a path outside the scan roots: {text}");
}

#[test]
fn test_fc_scan_is_idempotent_once_settled() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_scan", json!({ "force_rebuild": false }));
    assert!(!is_err, "fc_scan errored: {text}");
    let stats: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(stats["files_added"], 0);
    assert_eq!(stats["files_modified"], 0);
    assert_eq!(stats["files_removed"], 0);
}

#[test]
fn test_unknown_tool_name_is_reported_as_error() {
    let h = TestHarness::from_fixture("basic");
    let (text, is_err) = h.call_tool("fc_nonexistent", json!({}));
    assert!(is_err, "expected an error for an unknown tool: {text}");
}
