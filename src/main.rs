//! file-compass binary — thin CLI shell over the [`filecompass`] library.

use clap::{Parser, Subcommand};
use filecompass::config::FileCompassConfig;
use filecompass::engine::Engine;
use filecompass::mcp::dispatch_jsonrpc;
use filecompass::types::QueryFilters;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Semantic and lexical search over local code, docs, and config files.
#[derive(Parser)]
#[command(name = "file-compass", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directories to index (repeatable). Defaults to the current directory.
    #[arg(long, global = true)]
    root: Vec<PathBuf>,

    /// Path to a .file-compass.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or incrementally update the index.
    Scan {
        /// Rebuild from scratch even if a previous index exists.
        #[arg(long)]
        force: bool,
    },
    /// Run a semantic search against the index.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long)]
        min_relevance: Option<f32>,
    },
    /// Run a fast lexical/filename/symbol search.
    QuickSearch {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Print index status as JSON.
    Status,
    /// Start the HTTP API server.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8420")]
        bind: String,
    },
    /// Run as an MCP stdio server.
    Mcp,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("filecompass=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let roots = if cli.root.is_empty() { vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))] } else { cli.root };

    let config = match &cli.config {
        Some(path) => FileCompassConfig::load(path),
        None => Ok(FileCompassConfig::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let engine = match Engine::open(roots, config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            eprintln!("Error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Scan { force } => run_scan(&engine, force).await,
        Commands::Search { query, top_k, min_relevance } => run_search(&engine, &query, top_k, min_relevance.unwrap_or(0.0)).await,
        Commands::QuickSearch { query, top_k } => run_quick_search(&engine, &query, top_k),
        Commands::Status => run_status(&engine),
        Commands::Serve { bind } => run_serve(engine, &bind).await,
        Commands::Mcp => run_mcp(&engine).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run_scan(engine: &Engine, force: bool) -> Result<(), filecompass::error::EngineError> {
    let stats = engine.scan(None, force).await?;
    println!("{}", serde_json::to_string_pretty(&stats).unwrap());
    Ok(())
}

async fn run_search(engine: &Engine, query: &str, top_k: usize, min_relevance: f32) -> Result<(), filecompass::error::EngineError> {
    let results = engine.search(query, top_k, QueryFilters::default(), min_relevance).await?;
    println!("{}", serde_json::to_string_pretty(&results).unwrap());
    Ok(())
}

fn run_quick_search(engine: &Engine, query: &str, top_k: usize) -> Result<(), filecompass::error::EngineError> {
    let results = engine.quick_search(query, top_k, QueryFilters::default());
    println!("{}", serde_json::to_string_pretty(&results).unwrap());
    Ok(())
}

fn run_status(engine: &Engine) -> Result<(), filecompass::error::EngineError> {
    let status = engine.status()?;
    println!("{}", serde_json::to_string_pretty(&status).unwrap());
    Ok(())
}

async fn run_serve(engine: Arc<Engine>, bind: &str) -> Result<(), filecompass::error::EngineError> {
    let app = filecompass::http::router(engine.clone());
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| filecompass::error::EngineError::internal(e.to_string()))?;
    info!(bind, "file-compass HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await
        .map_err(|e| filecompass::error::EngineError::internal(e.to_string()))?;
    Ok(())
}

async fn run_mcp(engine: &Engine) -> Result<(), filecompass::error::EngineError> {
    info!("file-compass MCP server ready");
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                let err = serde_json::json!({ "jsonrpc": "2.0", "id": null, "error": { "code": -32700, "message": "Parse error" } });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{err}");
                let _ = out.flush();
                continue;
            }
        };

        if let Some(response) = dispatch_jsonrpc(engine, &msg).await {
            let mut out = stdout.lock();
            let _ = writeln!(out, "{response}");
            let _ = out.flush();
        }
    }
    Ok(())
}

/// Waits for SIGINT/SIGTERM, then signals the engine's cancellation token so
/// an in-flight `scan` unwinds at its next suspension point instead of being
/// torn down mid-write — axum's graceful shutdown only stops accepting new
/// connections, it does not abort a handler already in flight.
async fn shutdown_signal(engine: Arc<Engine>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }

    engine.request_shutdown();
}
