//! Incremental change detection (SPEC_FULL.md §4.4): a hash tree over file
//! records whose root summarizes the whole corpus and whose diff against a
//! prior tree drives incremental reindexing.

use crate::scanner::hex_sha256;
use crate::types::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Leaf {
    relative_path: String,
    hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MerkleTree {
    leaves: Vec<Leaf>,
    root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl MerkleTree {
    /// Builds a tree from the current file-record set. Leaves are sorted by
    /// relative path for determinism; odd leaves/nodes promote unchanged.
    pub fn build(files: &[FileRecord]) -> Self {
        let mut leaves: Vec<Leaf> = files
            .iter()
            .map(|f| {
                let material = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", f.relative_path, f.content_hash, 1, f.modified_at);
                Leaf { relative_path: f.relative_path.clone(), hash: hex_sha256(material.as_bytes()) }
            })
            .collect();
        leaves.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let root = Self::compute_root(&leaves);
        Self { leaves, root }
    }

    /// Builds a tree where each file's chunk count is known (used after
    /// chunking completes, so the leaf hash reflects the real chunk count
    /// rather than the placeholder `1` used during the initial scan pass).
    pub fn build_with_chunk_counts(files: &[FileRecord], chunk_counts: &BTreeMap<String, usize>) -> Self {
        let mut leaves: Vec<Leaf> = files
            .iter()
            .map(|f| {
                let count = chunk_counts.get(&f.relative_path).copied().unwrap_or(0);
                let material = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", f.relative_path, f.content_hash, count, f.modified_at);
                Leaf { relative_path: f.relative_path.clone(), hash: hex_sha256(material.as_bytes()) }
            })
            .collect();
        leaves.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let root = Self::compute_root(&leaves);
        Self { leaves, root }
    }

    fn compute_root(leaves: &[Leaf]) -> Option<String> {
        if leaves.is_empty() {
            return None;
        }
        let mut level: Vec<String> = leaves.iter().map(|l| l.hash.clone()).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i < level.len() {
                if i + 1 < level.len() {
                    let combined = format!("{}{}", level[i], level[i + 1]);
                    next.push(hex_sha256(combined.as_bytes()));
                    i += 2;
                } else {
                    next.push(level[i].clone());
                    i += 1;
                }
            }
            level = next;
        }
        level.into_iter().next()
    }

    pub fn root_hash(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Diffs `self` (new) against `previous` (old) by relative path.
    pub fn diff(&self, previous: &MerkleTree) -> MerkleDiff {
        let new_map: BTreeMap<&str, &str> =
            self.leaves.iter().map(|l| (l.relative_path.as_str(), l.hash.as_str())).collect();
        let old_map: BTreeMap<&str, &str> =
            previous.leaves.iter().map(|l| (l.relative_path.as_str(), l.hash.as_str())).collect();

        let mut diff = MerkleDiff::default();
        for (path, hash) in &new_map {
            match old_map.get(path) {
                None => diff.added.push((*path).to_string()),
                Some(old_hash) if old_hash != hash => diff.modified.push((*path).to_string()),
                _ => {}
            }
        }
        for path in old_map.keys() {
            if !new_map.contains_key(path) {
                diff.removed.push((*path).to_string());
            }
        }
        diff.added.sort();
        diff.modified.sort();
        diff.removed.sort();
        diff
    }

    pub fn save(&self, path: &std::path::Path) -> crate::error::EngineResult<()> {
        let bytes = serde_json::to_vec(self).map_err(|e| crate::error::EngineError::internal(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &std::path::Path) -> crate::error::EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| crate::error::EngineError::index_corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            id: 0,
            path: path.into(),
            relative_path: path.to_string(),
            file_type: FileType::Python,
            size_bytes: 10,
            modified_at: 0,
            content_hash: hash.to_string(),
        }
    }

    #[test]
    fn root_is_deterministic() {
        let files = vec![record("a.py", "h1"), record("b.py", "h2")];
        let t1 = MerkleTree::build(&files);
        let t2 = MerkleTree::build(&files);
        assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn diff_against_self_is_empty() {
        let files = vec![record("a.py", "h1")];
        let t = MerkleTree::build(&files);
        let d = t.diff(&t);
        assert!(d.added.is_empty() && d.modified.is_empty() && d.removed.is_empty());
    }

    #[test]
    fn diff_detects_added_modified_removed() {
        let old = MerkleTree::build(&[record("a.py", "h1"), record("b.py", "h2")]);
        let new = MerkleTree::build(&[record("a.py", "h1-changed"), record("c.py", "h3")]);
        let d = new.diff(&old);
        assert_eq!(d.added, vec!["c.py".to_string()]);
        assert_eq!(d.modified, vec!["a.py".to_string()]);
        assert_eq!(d.removed, vec!["b.py".to_string()]);
    }

    #[test]
    fn empty_tree_has_no_root() {
        let t = MerkleTree::build(&[]);
        assert!(t.root_hash().is_none());
    }
}
