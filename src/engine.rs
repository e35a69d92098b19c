//! Top-level orchestration (SPEC_FULL.md §4.10, §9): a single owned `Engine`
//! value replacing the original tool's lazy global-singleton index, wrapping
//! the Scanner, Chunker, Merkle Tree, Embedding Client, Vector Index,
//! Metadata Store, and Quick Index behind one lock, the way this codebase's
//! own `ServerState`/`AppContext` bundles its subsystems.

use crate::chunker::FileChunker;
use crate::config::FileCompassConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{EngineError, EngineResult};
use crate::merkle::MerkleTree;
use crate::metadata_store::MetadataStore;
use crate::query::QueryExecutor;
use crate::quick_index::QuickIndex;
use crate::scanner::{scan_files, validate_path};
use crate::symbols::extract_symbols;
use crate::types::{BuildStats, FileRecord, IndexStatus, QueryFilters, QuickResult, SearchResult};
use crate::vector_index::VectorIndex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One atomic counter assigning vector-ids across the process lifetime; the
/// Metadata Store is the source of truth for the chunk<->vector-id mapping,
/// this only hands out fresh ids.
static NEXT_VECTOR_ID: AtomicU64 = AtomicU64::new(1);

pub struct Engine {
    pub roots: RwLock<Vec<PathBuf>>,
    pub config: FileCompassConfig,
    pub data_dir: PathBuf,
    pub vector_index: RwLock<VectorIndex>,
    pub metadata: RwLock<MetadataStore>,
    pub quick_index: RwLock<QuickIndex>,
    pub embedding: EmbeddingClient,
    pub merkle: RwLock<MerkleTree>,
    /// Cancellation signal checked at every suspension point inside `scan`
    /// (§5): after each scanned file and before each embedding request. One
    /// shot — `request_shutdown` fires it once, for process shutdown, not a
    /// per-build token.
    cancel: CancellationToken,
}

impl Engine {
    /// Constructs the engine and loads any previously persisted state. A
    /// missing persisted file is not an error — the engine simply starts
    /// empty, as the first `scan` will perform a full build.
    pub fn open(roots: Vec<PathBuf>, config: FileCompassConfig) -> EngineResult<Self> {
        let data_dir = FileCompassConfig::data_dir()?;
        let vector_index = VectorIndex::load(
            &FileCompassConfig::vector_index_path(&data_dir),
            config.vector_dim,
            config.hnsw_m,
            config.hnsw_ef_search,
        )?;
        let metadata = MetadataStore::open(&FileCompassConfig::sqlite_path(&data_dir))?;
        let merkle = MerkleTree::load(&FileCompassConfig::merkle_path(&data_dir))?;

        let quick_index = QuickIndex::new();
        for file in metadata.all_files()? {
            let symbols = metadata
                .symbols_for_relative_path(&file.relative_path)?
                .into_iter()
                .map(|s| (s.name, s.line_number))
                .collect();
            quick_index.upsert(&file.relative_path, PathBuf::from(&file.path), file.parsed_file_type(), file.modified_at, symbols);
        }

        let embedding = EmbeddingClient::new(config.embedding_endpoint.clone(), config.embedding_model.clone(), config.vector_dim);

        Ok(Self {
            roots: RwLock::new(roots),
            config,
            data_dir,
            vector_index: RwLock::new(vector_index),
            metadata: RwLock::new(metadata),
            quick_index: RwLock::new(quick_index),
            embedding,
            merkle: RwLock::new(merkle),
            cancel: CancellationToken::new(),
        })
    }

    fn roots_snapshot(&self) -> Vec<PathBuf> {
        self.roots.read().unwrap().clone()
    }

    /// Signals every suspended `scan` to unwind at its next checkpoint,
    /// leaving the last successfully persisted state in place. One-way: the
    /// engine is not meant to run another build after the process has been
    /// asked to shut down.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs a full or incremental build depending on whether a prior Merkle
    /// tree exists and `force_rebuild` is unset (§4.10). Every mutation is
    /// made against a staging copy of the Metadata Store, Vector Index, and
    /// Quick Index; the live state is only ever replaced, under brief write
    /// locks, after a build finishes successfully (§5). A build that errors
    /// out or observes cancellation discards its staging copy and returns
    /// without ever touching the live state, so concurrent searchers never
    /// see a partial update and a cancelled build leaves the prior persisted
    /// state byte-for-byte unchanged.
    pub async fn scan(&self, roots_override: Option<Vec<PathBuf>>, force_rebuild: bool) -> EngineResult<BuildStats> {
        let started = Instant::now();
        if let Some(roots) = roots_override {
            *self.roots.write().unwrap() = roots;
        }
        let roots = self.roots_snapshot();
        if roots.is_empty() {
            return Err(EngineError::invalid_argument("no scan roots configured"));
        }

        info!(roots = ?roots, "scanning files");
        let scanned = scan_files(&roots, &self.config);

        // Chunk counts only change when content changes, so the *previous*
        // build's counts are what an unchanged file should still hash to;
        // added/modified files get a fresh count once indexing below
        // completes and their content_hash already marks them as changed.
        let (prior_counts, has_prior_state) = {
            let metadata = self.metadata.read().unwrap();
            (metadata.chunk_counts_by_relative_path()?, metadata.file_count()? > 0 && !force_rebuild)
        };
        let new_tree = MerkleTree::build_with_chunk_counts(&scanned, &prior_counts);
        let previous_tree = self.merkle.read().unwrap().clone();

        let staging_sqlite_path = FileCompassConfig::staging_sqlite_path(&self.data_dir);
        let live_sqlite_path = FileCompassConfig::sqlite_path(&self.data_dir);
        let _ = std::fs::remove_file(&staging_sqlite_path);

        let staging_metadata;
        let mut staging_vector_index;
        let staging_quick_index;
        if has_prior_state {
            self.metadata.read().unwrap().checkpoint()?;
            if live_sqlite_path.exists() {
                std::fs::copy(&live_sqlite_path, &staging_sqlite_path)?;
            }
            staging_metadata = MetadataStore::open(&staging_sqlite_path)?;
            staging_vector_index = self.vector_index.read().unwrap().clone();
            staging_quick_index = self.quick_index.read().unwrap().clone();
        } else {
            staging_metadata = MetadataStore::open(&staging_sqlite_path)?;
            staging_vector_index = VectorIndex::new(self.config.vector_dim, self.config.hnsw_m, self.config.hnsw_ef_search);
            staging_quick_index = QuickIndex::new();
        }

        let mut stats = BuildStats::default();
        let build_result = self
            .build_staging(&scanned, has_prior_state, &new_tree, &previous_tree, &staging_metadata, &mut staging_vector_index, &staging_quick_index, &mut stats)
            .await;

        if let Err(e) = build_result {
            let _ = std::fs::remove_file(&staging_sqlite_path);
            warn!(error = %e, "build aborted, prior persisted state retained");
            return Err(e);
        }

        // Rebuild with post-index counts so the persisted tree reflects the
        // chunk counts actually on disk, not the pre-index estimate used to
        // decide what needed reindexing.
        let final_counts = staging_metadata.chunk_counts_by_relative_path()?;
        let final_tree = MerkleTree::build_with_chunk_counts(&scanned, &final_counts);

        staging_vector_index.save(&FileCompassConfig::vector_index_path(&self.data_dir))?;
        final_tree.save(&FileCompassConfig::merkle_path(&self.data_dir))?;
        staging_metadata.set_meta("last_build_iso", &chrono::Utc::now().to_rfc3339())?;
        if let Some(root) = final_tree.root_hash() {
            staging_metadata.set_meta("merkle_root_hex", root)?;
        }
        staging_metadata.set_meta("vector_dim", &self.config.vector_dim.to_string())?;
        staging_metadata.checkpoint()?;
        std::fs::rename(&staging_sqlite_path, &live_sqlite_path)?;

        {
            let mut metadata = self.metadata.write().unwrap();
            let mut vector_index = self.vector_index.write().unwrap();
            let mut quick_index = self.quick_index.write().unwrap();
            let mut merkle = self.merkle.write().unwrap();
            *metadata = staging_metadata;
            *vector_index = staging_vector_index;
            *quick_index = staging_quick_index;
            *merkle = final_tree;
        }

        stats.duration_seconds = started.elapsed().as_secs_f64();
        info!(?stats, "scan complete");
        Ok(stats)
    }

    /// Applies every add/modify/remove implied by this build to the staging
    /// structures, checking `self.cancel` after each file (§5 "Scanner
    /// iteration yields after each file") and before each embedding request.
    #[allow(clippy::too_many_arguments)]
    async fn build_staging(
        &self,
        scanned: &[FileRecord],
        has_prior_state: bool,
        new_tree: &MerkleTree,
        previous_tree: &MerkleTree,
        staging_metadata: &MetadataStore,
        staging_vector_index: &mut VectorIndex,
        staging_quick_index: &QuickIndex,
        stats: &mut BuildStats,
    ) -> EngineResult<()> {
        if !has_prior_state {
            for file in scanned {
                if self.cancel.is_cancelled() {
                    return Err(EngineError::cancelled("scan cancelled"));
                }
                match self.index_one_file(file, staging_metadata, staging_vector_index, staging_quick_index).await {
                    Ok(chunks_indexed) => {
                        stats.files_added += 1;
                        stats.chunks_indexed += chunks_indexed;
                    }
                    Err(e) => warn!(file = %file.relative_path, error = %e, "failed to index file during full build"),
                }
            }
            return Ok(());
        }

        let diff = new_tree.diff(previous_tree);
        for path in &diff.removed {
            if self.cancel.is_cancelled() {
                return Err(EngineError::cancelled("scan cancelled"));
            }
            Self::remove_file(path, staging_metadata, staging_vector_index, staging_quick_index)?;
            stats.files_removed += 1;
        }
        for path in diff.added.iter().chain(diff.modified.iter()) {
            if self.cancel.is_cancelled() {
                return Err(EngineError::cancelled("scan cancelled"));
            }
            let Some(file) = scanned.iter().find(|f| &f.relative_path == path) else { continue };
            match self.index_one_file(file, staging_metadata, staging_vector_index, staging_quick_index).await {
                Ok(chunks_indexed) => stats.chunks_indexed += chunks_indexed,
                Err(e) => warn!(file = %path, error = %e, "failed to index file during incremental build"),
            }
        }
        stats.files_added = diff.added.len();
        stats.files_modified = diff.modified.len();
        Ok(())
    }

    async fn index_one_file(
        &self,
        file: &FileRecord,
        metadata: &MetadataStore,
        vector_index: &mut VectorIndex,
        quick_index: &QuickIndex,
    ) -> EngineResult<usize> {
        let raw = std::fs::read(&file.path)?;
        let content = String::from_utf8_lossy(&raw).to_string();

        // Re-hash immediately before chunking; a file that changed between
        // the scan pass and now is left SCANNED-only and retried next build.
        let fresh_hash = crate::scanner::hex_sha256(content.as_bytes());
        if fresh_hash != file.content_hash {
            debug!(file = %file.relative_path, "content changed mid-scan, deferring to next build");
            let file_id = metadata.upsert_file(file, now())?;
            metadata.replace_chunks(file_id, &[], &[])?;
            quick_index.remove(&file.relative_path);
            return Ok(0);
        }

        let file_id = metadata.upsert_file(file, now())?;

        // Symbols and the Quick Index are populated unconditionally: lexical
        // search never touches the embedding backend (§4.7), so an embedding
        // outage must not also blind filename/symbol search.
        let symbols = extract_symbols(file.file_type, &content);
        let mut symbols_with_file = symbols.clone();
        for s in &mut symbols_with_file {
            s.file_id = file_id;
        }
        metadata.replace_symbols(file_id, &symbols_with_file)?;
        quick_index.upsert(
            &file.relative_path,
            file.path.clone(),
            file.file_type,
            file.modified_at,
            symbols.into_iter().map(|s| (s.name, s.line_number)).collect(),
        );

        let chunker = FileChunker::new(self.config.max_chunk_tokens, self.config.chunk_overlap_tokens, self.config.min_chunk_tokens);
        let mut chunks = chunker.chunk_file(file.file_type, &content);
        for chunk in &mut chunks {
            chunk.file_id = file_id;
        }

        if self.cancel.is_cancelled() {
            return Err(EngineError::cancelled("scan cancelled"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = match self.embedding.embed_batch(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(file = %file.relative_path, error = %e, "embedding failed, file left scanned-only");
                metadata.replace_chunks(file_id, &[], &[])?;
                return Ok(0);
            }
        };

        let mut vector_ids = Vec::with_capacity(chunks.len());
        for vector in vectors {
            let id = NEXT_VECTOR_ID.fetch_add(1, Ordering::SeqCst);
            vector_index.insert(id, vector)?;
            vector_ids.push(id);
        }

        metadata.replace_chunks(file_id, &chunks, &vector_ids)?;

        Ok(chunks.len())
    }

    fn remove_file(relative_path: &str, metadata: &MetadataStore, vector_index: &mut VectorIndex, quick_index: &QuickIndex) -> EngineResult<()> {
        // Drop vectors owned by this file's chunks before the cascade delete
        // removes the rows that record which vector-ids they were.
        let vector_ids = metadata.vector_ids_for_relative_path(relative_path)?;
        for id in vector_ids {
            vector_index.delete(id);
        }
        metadata.delete_file_by_relative_path(relative_path)?;
        quick_index.remove(relative_path);
        Ok(())
    }

    pub async fn search(&self, query: &str, top_k: usize, filters: QueryFilters, min_relevance: f32) -> EngineResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(EngineError::invalid_argument("query must not be empty"));
        }
        if !(1..=50).contains(&top_k) {
            return Err(EngineError::invalid_argument("top_k must be between 1 and 50"));
        }
        let query_vector = self.embedding.embed_query(query).await?;
        let vector_index = self.vector_index.read().unwrap();
        let metadata = self.metadata.read().unwrap();
        let executor = QueryExecutor {
            vector_index: &vector_index,
            metadata: &metadata,
            embedding: &self.embedding,
            over_fetch_factor: self.config.over_fetch_factor,
        };
        executor.search(query, &query_vector, top_k, &filters, min_relevance)
    }

    pub fn quick_search(&self, query: &str, top_k: usize, filters: QueryFilters) -> Vec<QuickResult> {
        self.quick_index.read().unwrap().search(
            query,
            top_k,
            filters.file_types.as_deref(),
            filters.directory.as_deref(),
            filters.git_only,
            filters.recent_days,
        )
    }

    pub fn status(&self) -> EngineResult<IndexStatus> {
        let metadata = self.metadata.read().unwrap();
        Ok(IndexStatus {
            files_indexed: metadata.file_count()?,
            chunks_indexed: metadata.chunk_count()?,
            total_size_bytes: metadata.total_size_bytes()?,
            last_build_iso: metadata.get_meta("last_build_iso")?,
            merkle_root_hex: metadata.get_meta("merkle_root_hex")?,
            file_type_histogram: metadata.file_type_histogram()?,
        })
    }

    /// Returns a line-numbered slice of `path`, validated against the
    /// configured roots (§6 `preview`, §7 `AccessDenied`).
    pub fn preview(&self, path: &Path, line_start: Option<usize>, line_end: Option<usize>) -> EngineResult<String> {
        let roots = self.roots_snapshot();
        validate_path(path, &roots)?;

        let content = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let start = line_start.unwrap_or(1);
        let end = line_end.unwrap_or(lines.len());

        if start == 0 || start > end || start > lines.len() {
            return Err(EngineError::invalid_argument("line_start out of range"));
        }
        let end = end.min(lines.len());

        let mut out = String::new();
        for (i, line) in lines[start - 1..end].iter().enumerate() {
            out.push_str(&format!("{:>6}  {}\n", start + i, line));
        }
        Ok(out)
    }
}

fn now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
