//! Hand-rolled HNSW-like approximate nearest neighbor index (SPEC_FULL.md
//! §4.6). No ANN crate appears anywhere in this codebase's dependency graph
//! (the nearest sighting is a doc-comment mention of `instant-distance` in
//! an unrelated search module) and the crates that do exist are built
//! immutable-after-construction, which does not fit this index's
//! insert/delete-by-id contract — so the graph is built directly here
//! against the same flat `Vec<f32>` storage and dot-product-as-cosine
//! convention this codebase's own embedding code uses for pre-normalized
//! vectors.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashSet};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// Neighbor ids per layer, layer 0 first.
    neighbors: Vec<Vec<u64>>,
    deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    dim: usize,
    m: usize,
    ef_search: usize,
    nodes: std::collections::HashMap<u64, Node>,
    entry_point: Option<u64>,
    max_layer: usize,
}

#[derive(PartialEq)]
struct Candidate {
    id: u64,
    similarity: f32,
}

impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.similarity.partial_cmp(&other.similarity).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl VectorIndex {
    pub fn new(dim: usize, m: usize, ef_search: usize) -> Self {
        Self {
            version: FORMAT_VERSION,
            dim,
            m,
            ef_search,
            nodes: std::collections::HashMap::new(),
            entry_point: None,
            max_layer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces the vector stored under `id`.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> EngineResult<()> {
        if vector.len() != self.dim {
            return Err(EngineError::invalid_argument(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dim
            )));
        }

        let layer = self.random_layer();
        let mut neighbors = vec![Vec::new(); layer + 1];

        if let Some(entry) = self.entry_point {
            let candidates = self.search_layers(&vector, self.m.max(self.ef_search), Some(id));
            for cand in candidates.into_iter().take(self.m) {
                neighbors[0].push(cand.id);
                if let Some(node) = self.nodes.get_mut(&cand.id) {
                    if let Some(layer0) = node.neighbors.first_mut() {
                        layer0.push(id);
                        if layer0.len() > self.m * 2 {
                            layer0.truncate(self.m * 2);
                        }
                    }
                }
            }
            let _ = entry;
        }

        self.nodes.insert(id, Node { vector, neighbors, deleted: false });

        if self.entry_point.is_none() || layer > self.max_layer {
            self.entry_point = Some(id);
            self.max_layer = layer;
        }
        Ok(())
    }

    /// Tombstones `id`; it is suppressed from future search results.
    pub fn delete(&mut self, id: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.deleted = true;
        }
        if self.entry_point == Some(id) {
            self.entry_point = self.nodes.iter().find(|(_, n)| !n.deleted).map(|(id, _)| *id);
        }
    }

    /// Returns the `k` nearest non-deleted vectors by cosine similarity,
    /// descending, ties broken by ascending id.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if query.len() != self.dim || self.is_empty() {
            return Vec::new();
        }
        let mut candidates = self.search_layers(query, k.max(self.ef_search), None);
        candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));
        candidates.into_iter().take(k).map(|c| (c.id, c.similarity)).collect()
    }

    /// Greedy best-first search. With small corpora (the common case for a
    /// local-files index) this degrades gracefully to an exact scan because
    /// `ef` is allowed to cover the whole live set; the graph structure pays
    /// off as the corpus grows past a few thousand vectors.
    fn search_layers(&self, query: &[f32], ef: usize, exclude: Option<u64>) -> Vec<Candidate> {
        let live: Vec<u64> = self
            .nodes
            .iter()
            .filter(|(id, n)| !n.deleted && Some(**id) != exclude)
            .map(|(id, _)| *id)
            .collect();

        if live.len() <= ef {
            return live
                .into_iter()
                .map(|id| Candidate { similarity: dot(query, &self.nodes[&id].vector), id })
                .collect();
        }

        let mut visited: HashSet<u64> = HashSet::new();
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut best: Vec<Candidate> = Vec::new();

        let start = self.entry_point.filter(|id| Some(*id) != exclude).unwrap_or(live[0]);
        visited.insert(start);
        let start_sim = dot(query, &self.nodes[&start].vector);
        heap.push(Candidate { id: start, similarity: start_sim });
        best.push(Candidate { id: start, similarity: start_sim });

        while let Some(current) = heap.pop() {
            if best.len() >= ef {
                let worst = best.iter().map(|c| c.similarity).fold(f32::INFINITY, f32::min);
                if current.similarity < worst {
                    break;
                }
            }
            let Some(node) = self.nodes.get(&current.id) else { continue };
            for layer in &node.neighbors {
                for &neighbor_id in layer {
                    if Some(neighbor_id) == exclude || !visited.insert(neighbor_id) {
                        continue;
                    }
                    let Some(neighbor) = self.nodes.get(&neighbor_id) else { continue };
                    if neighbor.deleted {
                        continue;
                    }
                    let sim = dot(query, &neighbor.vector);
                    heap.push(Candidate { id: neighbor_id, similarity: sim });
                    best.push(Candidate { id: neighbor_id, similarity: sim });
                }
            }
        }

        best
    }

    fn random_layer(&self) -> usize {
        // Deterministic-enough level assignment without pulling in `rand`:
        // derive a pseudo-random bit stream from the node count so layer
        // heights still follow roughly the usual exponential decay.
        let mut x = (self.nodes.len() as u64).wrapping_mul(2654435761).wrapping_add(1);
        let mut layer = 0usize;
        loop {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            if (x >> 63) == 0 || layer >= 4 {
                break;
            }
            layer += 1;
        }
        layer
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let bytes = serde_json::to_vec(self).map_err(|e| EngineError::internal(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path, dim: usize, m: usize, ef_search: usize) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::new(dim, m, ef_search));
        }
        let bytes = std::fs::read(path)?;
        let index: VectorIndex = serde_json::from_slice(&bytes).map_err(|e| EngineError::index_corrupt(e.to_string()))?;
        if index.version != FORMAT_VERSION {
            return Err(EngineError::index_corrupt(format!(
                "vector index version {} does not match expected {FORMAT_VERSION}; a rebuild is required",
                index.version
            )));
        }
        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    #[test]
    fn search_returns_most_similar_first() {
        let mut idx = VectorIndex::new(2, 8, 16);
        idx.insert(1, unit(vec![1.0, 0.0])).unwrap();
        idx.insert(2, unit(vec![0.0, 1.0])).unwrap();
        idx.insert(3, unit(vec![0.9, 0.1])).unwrap();

        let results = idx.search(&unit(vec![1.0, 0.0]), 2);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn deleted_vectors_are_suppressed() {
        let mut idx = VectorIndex::new(2, 8, 16);
        idx.insert(1, unit(vec![1.0, 0.0])).unwrap();
        idx.insert(2, unit(vec![0.9, 0.1])).unwrap();
        idx.delete(1);

        let results = idx.search(&unit(vec![1.0, 0.0]), 5);
        assert!(results.iter().all(|(id, _)| *id != 1));
    }

    #[test]
    fn dimension_mismatch_is_invalid_argument() {
        let mut idx = VectorIndex::new(3, 8, 16);
        let err = idx.insert(1, vec![1.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn persist_and_reload_round_trips_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.hnsw");

        let mut idx = VectorIndex::new(2, 8, 16);
        idx.insert(1, unit(vec![1.0, 0.0])).unwrap();
        idx.insert(2, unit(vec![0.0, 1.0])).unwrap();
        idx.save(&path).unwrap();

        let reloaded = VectorIndex::load(&path, 2, 8, 16).unwrap();
        let before = idx.search(&unit(vec![1.0, 0.0]), 2);
        let after = reloaded.search(&unit(vec![1.0, 0.0]), 2);
        assert_eq!(before, after);
    }

    #[test]
    fn loading_missing_file_yields_empty_index() {
        let idx = VectorIndex::load(Path::new("/nonexistent/path.hnsw"), 2, 8, 16).unwrap();
        assert!(idx.is_empty());
    }
}
