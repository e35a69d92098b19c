//! Test harness for MCP tool integration tests.
//!
//! Builds an `Engine` over a fixture project copied into a temp dir, backed
//! by a tiny in-process HTTP stub standing in for the embedding backend, and
//! dispatches JSON-RPC requests straight through `dispatch_jsonrpc()` — no
//! subprocess, no real network.

pub mod fixtures;

use filecompass::config::FileCompassConfig;
use filecompass::engine::Engine;
use filecompass::mcp::dispatch_jsonrpc;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use tempfile::TempDir;

const VECTOR_DIM: usize = 8;

/// `FILE_COMPASS_DATA_DIR` is process-global; serialize harness construction
/// so concurrently-running tests don't race on it.
static ENV_GUARD: Mutex<()> = Mutex::new(());

pub struct TestHarness {
    pub engine: Engine,
    _root: TempDir,
    _data_dir: TempDir,
}

impl TestHarness {
    /// Builds a harness from a named fixture directory and scans it.
    pub fn from_fixture(name: &str) -> Self {
        let fixture_src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        assert!(fixture_src.exists(), "fixture '{name}' not found at {}", fixture_src.display());

        let root = TempDir::new().expect("failed to create temp root");
        fixtures::copy_dir_recursive(&fixture_src, root.path());

        let data_dir = TempDir::new().expect("failed to create temp data dir");
        let endpoint = spawn_stub_embedding_server();

        let mut config = FileCompassConfig::default();
        config.vector_dim = VECTOR_DIM;
        config.embedding_endpoint = endpoint;

        let engine = {
            let _guard = ENV_GUARD.lock().unwrap();
            std::env::set_var("FILE_COMPASS_DATA_DIR", data_dir.path());
            Engine::open(vec![root.path().to_path_buf()], config).expect("failed to open engine")
        };

        let harness = TestHarness { engine, _root: root, _data_dir: data_dir };
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(harness.engine.scan(None, true)).expect("initial scan failed");
        harness
    }

    /// Calls an MCP tool by name with the given arguments. Returns `(text, is_error)`.
    pub fn call_tool(&self, tool: &str, args: Value) -> (String, bool) {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": tool, "arguments": args }
        });
        let rt = tokio::runtime::Runtime::new().unwrap();
        let resp = rt.block_on(dispatch_jsonrpc(&self.engine, &msg)).expect("expected a response for tools/call");
        let text = resp["result"]["content"][0]["text"].as_str().unwrap_or("").to_string();
        let is_error = text.starts_with("\u{26a0} Error:");
        (text, is_error)
    }

    pub fn root_path(&self) -> &std::path::Path {
        self._root.path()
    }

    pub fn initialize(&self) -> Value {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.1.0" }
            }
        });
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(dispatch_jsonrpc(&self.engine, &msg)).expect("expected an initialize response")
    }
}

/// A minimal HTTP/1.1 server that answers every request with a deterministic
/// embedding batch, one basis vector per input, sized to `VECTOR_DIM`.
fn spawn_stub_embedding_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind stub embedding server");
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = vec![0u8; 65536];
            let Ok(n) = stream.read(&mut buf) else { continue };
            let request = String::from_utf8_lossy(&buf[..n]);
            let body = request.split("\r\n\r\n").nth(1).unwrap_or("");
            let parsed: Value = serde_json::from_str(body).unwrap_or(serde_json::json!({}));
            let count = parsed["input"].as_array().map(|a| a.len()).unwrap_or(0);

            let embeddings: Vec<Vec<f32>> = (0..count)
                .map(|i| {
                    let mut v = vec![0.0f32; VECTOR_DIM];
                    v[i % VECTOR_DIM] = 1.0;
                    v
                })
                .collect();
            let payload = serde_json::json!({ "embeddings": embeddings }).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    format!("http://{addr}")
}
