//! MCP JSON-RPC tool dispatch (SPEC_FULL.md §6), mirroring this codebase's
//! `dispatch_jsonrpc` shape: one entry point shared by the stdio and HTTP
//! transports, `initialize`/`tools/list`/`tools/call`, and version
//! negotiation against a small supported-versions list.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::query::parse_file_types;
use crate::types::QueryFilters;
use serde_json::{json, Value};
use std::path::PathBuf;

pub(crate) const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18"];
pub(crate) const LATEST_VERSION: &str = "2025-06-18";

pub(crate) fn negotiate_version(client_version: &str) -> &'static str {
    SUPPORTED_VERSIONS.iter().find(|&&v| v == client_version).copied().unwrap_or(LATEST_VERSION)
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "fc_search",
            "description": "Semantic search over indexed files. Returns ranked chunks with explained relevance.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer", "minimum": 1, "maximum": 50 },
                    "file_types": { "type": "array", "items": { "type": "string" } },
                    "directory": { "type": "string" },
                    "git_only": { "type": "boolean" },
                    "min_relevance": { "type": "number", "minimum": 0, "maximum": 1 }
                },
                "required": ["query"]
            }
        },
        {
            "name": "fc_preview",
            "description": "Read a line-numbered slice of an indexed file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "line_start": { "type": "integer" },
                    "line_end": { "type": "integer" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "fc_status",
            "description": "Index status: file/chunk counts, last build time, file-type histogram.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "fc_scan",
            "description": "Build or incrementally update the index over the configured (or given) roots.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "roots": { "type": "array", "items": { "type": "string" } },
                    "force_rebuild": { "type": "boolean" }
                }
            }
        },
        {
            "name": "fc_quick_search",
            "description": "Fast lexical/filename/symbol search that never calls the embedding backend.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" },
                    "file_types": { "type": "array", "items": { "type": "string" } },
                    "directory": { "type": "string" },
                    "git_only": { "type": "boolean" }
                },
                "required": ["query"]
            }
        }
    ])
}

/// Processes one JSON-RPC request and returns the response, or `None` for
/// notifications (no `id`).
pub async fn dispatch_jsonrpc(engine: &Engine, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => {
            let client_version = msg["params"]["protocolVersion"].as_str().unwrap_or("");
            let negotiated = negotiate_version(client_version);
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": negotiated,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "file-compass", "version": env!("CARGO_PKG_VERSION") },
                    "instructions": "file-compass indexes local files for semantic and lexical search. Use fc_scan to build the index, fc_search for semantic queries, fc_quick_search for instant filename/symbol lookups, fc_preview to read a match, fc_status to check index health."
                }
            })
        }
        "tools/list" => json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": tool_definitions() } }),
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(json!({}));
            let (text, is_error) = handle_tool_call(engine, tool_name, &arguments).await;

            // Never set isError: true on the envelope — clients that treat a
            // tool-call error as fatal abort sibling calls in flight. The
            // failure is still visible to the caller via the text prefix.
            let content_text = if is_error { format!("\u{26a0} Error: {text}") } else { text };
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{ "type": "text", "text": content_text }], "isError": false }
            })
        }
        "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "Method not found" } }),
    };

    Some(response)
}

async fn handle_tool_call(engine: &Engine, tool_name: &str, arguments: &Value) -> (String, bool) {
    let result = match tool_name {
        "fc_search" => handle_search(engine, arguments).await,
        "fc_preview" => handle_preview(engine, arguments),
        "fc_status" => handle_status(engine),
        "fc_scan" => handle_scan(engine, arguments).await,
        "fc_quick_search" => handle_quick_search(engine, arguments),
        other => Err(EngineError::invalid_argument(format!("unknown tool: {other}"))),
    };

    match result {
        Ok(text) => (text, false),
        Err(e) => (e.to_string(), true),
    }
}

async fn handle_search(engine: &Engine, args: &Value) -> Result<String, EngineError> {
    let query = args["query"].as_str().ok_or_else(|| EngineError::invalid_argument("query is required"))?;
    let top_k = args["top_k"].as_u64().unwrap_or(10) as usize;
    let min_relevance = args["min_relevance"].as_f64().unwrap_or(0.0) as f32;

    let file_types = match args["file_types"].as_array() {
        Some(arr) => Some(parse_file_types(&arr.iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>())?),
        None => None,
    };
    let filters = QueryFilters {
        file_types,
        directory: args["directory"].as_str().map(String::from),
        git_only: args["git_only"].as_bool().unwrap_or(false),
        recent_days: None,
    };

    let results = engine.search(query, top_k, filters, min_relevance).await?;
    serde_json::to_string(&results).map_err(|e| EngineError::internal(e.to_string()))
}

fn handle_preview(engine: &Engine, args: &Value) -> Result<String, EngineError> {
    let path = args["path"].as_str().ok_or_else(|| EngineError::invalid_argument("path is required"))?;
    let line_start = args["line_start"].as_u64().map(|v| v as usize);
    let line_end = args["line_end"].as_u64().map(|v| v as usize);
    engine.preview(&PathBuf::from(path), line_start, line_end)
}

fn handle_status(engine: &Engine) -> Result<String, EngineError> {
    let status = engine.status()?;
    serde_json::to_string(&status).map_err(|e| EngineError::internal(e.to_string()))
}

async fn handle_scan(engine: &Engine, args: &Value) -> Result<String, EngineError> {
    let roots = args["roots"].as_array().map(|arr| arr.iter().filter_map(|v| v.as_str().map(PathBuf::from)).collect::<Vec<_>>());
    let force_rebuild = args["force_rebuild"].as_bool().unwrap_or(false);
    let stats = engine.scan(roots, force_rebuild).await?;
    serde_json::to_string(&stats).map_err(|e| EngineError::internal(e.to_string()))
}

fn handle_quick_search(engine: &Engine, args: &Value) -> Result<String, EngineError> {
    let query = args["query"].as_str().ok_or_else(|| EngineError::invalid_argument("query is required"))?;
    let top_k = args["top_k"].as_u64().unwrap_or(10) as usize;
    let file_types = match args["file_types"].as_array() {
        Some(arr) => Some(parse_file_types(&arr.iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>())?),
        None => None,
    };
    let filters = QueryFilters {
        file_types,
        directory: args["directory"].as_str().map(String::from),
        git_only: args["git_only"].as_bool().unwrap_or(false),
        recent_days: None,
    };
    let results = engine.quick_search(query, top_k, filters);
    serde_json::to_string(&results).map_err(|e| EngineError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_echoes_supported_version() {
        assert_eq!(negotiate_version("2025-06-18"), "2025-06-18");
    }

    #[test]
    fn negotiate_falls_back_to_latest_for_unknown_version() {
        assert_eq!(negotiate_version("1999-01-01"), LATEST_VERSION);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FILE_COMPASS_DATA_DIR", dir.path());
        let engine = Engine::open(vec![], crate::config::FileCompassConfig::default()).unwrap();
        let msg = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(dispatch_jsonrpc(&engine, &msg).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FILE_COMPASS_DATA_DIR", dir.path());
        let engine = Engine::open(vec![], crate::config::FileCompassConfig::default()).unwrap();
        let msg = json!({ "jsonrpc": "2.0", "id": 1, "method": "nonexistent" });
        let response = dispatch_jsonrpc(&engine, &msg).await.unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }
}
