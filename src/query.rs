//! Hybrid query execution: embed, over-fetch from the vector index, join
//! against the metadata store, filter, rank, explain (SPEC_FULL.md §4.8).

use crate::embedding::EmbeddingClient;
use crate::error::{EngineError, EngineResult};
use crate::explainer::Explainer;
use crate::metadata_store::MetadataStore;
use crate::types::{FileType, QueryFilters, SearchResult};
use crate::vector_index::VectorIndex;

pub struct QueryExecutor<'a> {
    pub vector_index: &'a VectorIndex,
    pub metadata: &'a MetadataStore,
    pub embedding: &'a EmbeddingClient,
    pub over_fetch_factor: usize,
}

impl<'a> QueryExecutor<'a> {
    /// Runs the hybrid search given an already-embedded `query_vector`.
    ///
    /// Callers embed the query themselves before acquiring the index/metadata
    /// read locks held for the duration of this call, so that no lock guard
    /// is ever held across an `.await` (the embedding call is async; this
    /// method is not).
    pub fn search(
        &self,
        query: &str,
        query_vector: &[f32],
        top_k: usize,
        filters: &QueryFilters,
        min_relevance: f32,
    ) -> EngineResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(EngineError::invalid_argument("query must not be empty"));
        }
        if !(1..=50).contains(&top_k) {
            return Err(EngineError::invalid_argument("top_k must be between 1 and 50"));
        }
        if self.vector_index.is_empty() {
            return Err(EngineError::not_indexed("no files have been indexed yet; run `scan` first"));
        }

        let fetch_k = (top_k * self.over_fetch_factor.max(1)).max(top_k);
        let candidates = self.vector_index.search(query_vector, fetch_k);

        let mut results = Vec::new();
        for (vector_id, similarity) in candidates {
            let Some((chunk, file)) = self.metadata.chunk_with_file_by_vector_id(vector_id)? else {
                continue;
            };

            if let Some(types) = &filters.file_types {
                if !types.contains(&file.parsed_file_type()) {
                    continue;
                }
            }
            if let Some(dir) = &filters.directory {
                if !file.relative_path.starts_with(dir.as_str()) {
                    continue;
                }
            }
            if filters.git_only && !crate::git::is_tracked(std::path::Path::new(&file.path)) {
                continue;
            }

            let relevance = normalize_similarity(similarity);
            if relevance < min_relevance {
                continue;
            }

            let chunk_type = chunk.parsed_chunk_type();
            let (reasons, _summary) =
                Explainer::explain(query, &chunk.preview, &file.relative_path, chunk.name.as_deref(), chunk_type, relevance);

            results.push(SearchResult {
                path: file.path.clone(),
                relative_path: file.relative_path.clone(),
                chunk_type: chunk_type.as_str().to_string(),
                name: chunk.name.clone(),
                line_start: chunk.line_start,
                line_end: chunk.line_end,
                preview: chunk.preview.clone(),
                relevance,
                reasons,
            });
        }

        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
                .then_with(|| a.line_start.cmp(&b.line_start))
        });
        results.truncate(top_k);
        Ok(results)
    }
}

/// Clips cosine similarity to `[0, 1]` — negative similarity carries no
/// useful ranking signal for this corpus and is floored at zero.
fn normalize_similarity(cosine: f32) -> f32 {
    cosine.clamp(0.0, 1.0)
}

pub fn parse_file_types(raw: &[String]) -> EngineResult<Vec<FileType>> {
    raw.iter()
        .map(|s| FileType::parse(s).ok_or_else(|| EngineError::invalid_argument(format!("unknown file type: {s}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clips_negative_similarity_to_zero() {
        assert_eq!(normalize_similarity(-0.4), 0.0);
    }

    #[test]
    fn normalize_passes_through_mid_range() {
        assert_eq!(normalize_similarity(0.7), 0.7);
    }

    #[test]
    fn parse_file_types_rejects_unknown() {
        let err = parse_file_types(&["not_a_type".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
