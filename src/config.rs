//! On-disk configuration, layered under hardcoded defaults.
//!
//! Mirrors this codebase's `.codescope.toml`-style layering: an optional TOML
//! file at the scan root (or a path given on the command line) is merged over
//! defaults, and no field is required.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_skip_dirs() -> HashSet<String> {
    [
        ".git",
        "node_modules",
        "__pycache__",
        "venv",
        ".venv",
        "target",
        "dist",
        "build",
        ".mypy_cache",
        ".pytest_cache",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_extensions() -> HashSet<String> {
    ["py", "md", "markdown", "json", "yaml", "yml", "rs", "js", "jsx", "ts", "tsx", "go", "toml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCompassConfig {
    pub scan_dirs: Vec<String>,
    pub skip_dirs: HashSet<String>,
    pub extensions: HashSet<String>,
    pub max_chunk_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub min_chunk_tokens: usize,
    pub embedding_model: String,
    pub embedding_endpoint: String,
    pub embed_batch_size: usize,
    pub vector_dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    pub over_fetch_factor: usize,
}

impl Default for FileCompassConfig {
    fn default() -> Self {
        Self {
            scan_dirs: Vec::new(),
            skip_dirs: default_skip_dirs(),
            extensions: default_extensions(),
            max_chunk_tokens: 400,
            chunk_overlap_tokens: 50,
            min_chunk_tokens: 20,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_endpoint: "http://localhost:11434/api/embed".to_string(),
            embed_batch_size: 32,
            vector_dim: 768,
            hnsw_m: 16,
            hnsw_ef_search: 64,
            over_fetch_factor: 3,
        }
    }
}

impl FileCompassConfig {
    /// Loads `.file-compass.toml` from `path` if present, falling back to
    /// defaults. A missing file is not an error; a malformed one is.
    pub fn load(path: &Path) -> crate::error::EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| crate::error::EngineError::invalid_argument(format!("invalid config at {}: {e}", path.display())))
    }

    /// Resolves the data directory: `FILE_COMPASS_DATA_DIR` env override, else
    /// `~/.file-compass`. The directory is created if missing.
    pub fn data_dir() -> crate::error::EngineResult<PathBuf> {
        let dir = match std::env::var_os("FILE_COMPASS_DATA_DIR") {
            Some(v) => PathBuf::from(v),
            None => dirs::home_dir()
                .ok_or_else(|| crate::error::EngineError::internal("could not resolve home directory"))?
                .join(".file-compass"),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn vector_index_path(data_dir: &Path) -> PathBuf {
        data_dir.join("file_compass.hnsw")
    }

    pub fn sqlite_path(data_dir: &Path) -> PathBuf {
        data_dir.join("files.db")
    }

    /// Scratch path a build stages its metadata store into before the
    /// atomic rename over `sqlite_path` (§4.10, §5).
    pub fn staging_sqlite_path(data_dir: &Path) -> PathBuf {
        data_dir.join("files.db.staging")
    }

    pub fn merkle_path(data_dir: &Path) -> PathBuf {
        data_dir.join("merkle.state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = FileCompassConfig::default();
        assert_eq!(cfg.vector_dim, 768);
        assert!(cfg.skip_dirs.contains(".git"));
        assert!(cfg.extensions.contains("py"));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = FileCompassConfig::load(Path::new("/nonexistent/.file-compass.toml")).unwrap();
        assert_eq!(cfg.max_chunk_tokens, 400);
    }

    #[test]
    fn persisted_paths_use_spec_names() {
        let dir = PathBuf::from("/tmp/fc-test-data");
        assert_eq!(FileCompassConfig::vector_index_path(&dir).file_name().unwrap(), "file_compass.hnsw");
        assert_eq!(FileCompassConfig::sqlite_path(&dir).file_name().unwrap(), "files.db");
        assert_eq!(FileCompassConfig::staging_sqlite_path(&dir).file_name().unwrap(), "files.db.staging");
        assert_eq!(FileCompassConfig::merkle_path(&dir).file_name().unwrap(), "merkle.state");
    }
}
