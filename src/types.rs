//! Core data model: file records, chunks, and symbols (see SPEC_FULL.md §3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse file-type tag derived from extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Python,
    Markdown,
    Json,
    Yaml,
    Rust,
    JavaScript,
    TypeScript,
    Go,
    Other,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => FileType::Python,
            "md" | "markdown" => FileType::Markdown,
            "json" => FileType::Json,
            "yaml" | "yml" => FileType::Yaml,
            "rs" => FileType::Rust,
            "js" | "jsx" | "mjs" | "cjs" => FileType::JavaScript,
            "ts" | "tsx" => FileType::TypeScript,
            "go" => FileType::Go,
            _ => FileType::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Python => "python",
            FileType::Markdown => "markdown",
            FileType::Json => "json",
            FileType::Yaml => "yaml",
            FileType::Rust => "rust",
            FileType::JavaScript => "javascript",
            FileType::TypeScript => "typescript",
            FileType::Go => "go",
            FileType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "python" => FileType::Python,
            "markdown" => FileType::Markdown,
            "json" => FileType::Json,
            "yaml" => FileType::Yaml,
            "rust" => FileType::Rust,
            "javascript" => FileType::JavaScript,
            "typescript" => FileType::TypeScript,
            "go" => FileType::Go,
            "other" => FileType::Other,
            _ => return None,
        })
    }
}

/// A file as seen by the scanner: identity, content hash, and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    pub relative_path: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub modified_at: i64,
    /// Hex-encoded SHA-256 over the raw file bytes.
    pub content_hash: String,
}

/// The kind of region a [`Chunk`] spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    WholeFile,
    Function,
    Class,
    Module,
    Section,
    Window,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::WholeFile => "whole_file",
            ChunkType::Function => "function",
            ChunkType::Class => "class",
            ChunkType::Module => "module",
            ChunkType::Section => "section",
            ChunkType::Window => "window",
        }
    }
}

/// A contiguous, line-bounded unit of a file — the thing that gets embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub file_id: i64,
    pub chunk_type: ChunkType,
    pub name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
    pub preview: String,
    pub vector_id: Option<u64>,
}

impl Chunk {
    /// Token estimate used by the chunker's size thresholds: `words * 1.3`.
    pub fn token_estimate(content: &str) -> f64 {
        content.split_whitespace().count() as f64 * 1.3
    }

    pub fn make_preview(content: &str) -> String {
        let trimmed = content.trim_end();
        if trimmed.chars().count() <= 200 {
            trimmed.to_string()
        } else {
            let truncated: String = trimmed.chars().take(200).collect();
            format!("{truncated}...")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Other,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Other => "other",
        }
    }
}

/// A named definition discovered by a cheap structural scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub file_id: i64,
    pub name: String,
    pub kind: SymbolKind,
    pub line_number: usize,
}

/// A filter set accepted by both `search` and `quick_search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub file_types: Option<Vec<FileType>>,
    pub directory: Option<String>,
    pub git_only: bool,
    pub recent_days: Option<u32>,
}

/// One ranked hit returned from `search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: String,
    pub relative_path: String,
    pub chunk_type: String,
    pub name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub preview: String,
    pub relevance: f32,
    pub reasons: Vec<crate::explainer::MatchReason>,
}

/// One hit returned from `quick_search` — no embedding involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickResult {
    pub path: String,
    pub relative_path: String,
    pub name: Option<String>,
    pub line_number: Option<usize>,
    pub score: f32,
    pub modified_at: i64,
}

/// Aggregate index status returned by the `status` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub total_size_bytes: u64,
    pub last_build_iso: Option<String>,
    pub merkle_root_hex: Option<String>,
    pub file_type_histogram: std::collections::BTreeMap<String, usize>,
}

/// Statistics returned by a `scan` build, whether full or incremental.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub chunks_indexed: usize,
    pub duration_seconds: f64,
}
