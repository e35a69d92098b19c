//! In-memory lexical/symbol/filename index for sub-100ms lookups that never
//! touch the embedding backend (SPEC_FULL.md §4.7). Grounded in this
//! codebase's bitmask-prefiltered fuzzy search entries and its Laplace-
//! smoothed term-frequency scoring, generalized here into one composite
//! filename/path/symbol score.

use crate::types::{FileType, QuickResult};
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    relative_path: String,
    file_type: FileType,
    modified_at: i64,
    file_name: String,
    symbols: Vec<(String, usize)>,
}

/// Concurrent-read lexical index: one entry per scanned file, plus its
/// extracted symbol names, scored by filename/path/symbol match weight.
#[derive(Default, Clone)]
pub struct QuickIndex {
    entries: DashMap<String, Entry>,
}

const WEIGHT_EXACT_FILENAME: f32 = 1.0;
const WEIGHT_FILENAME_FRAGMENT: f32 = 0.6;
const WEIGHT_SYMBOL_MATCH: f32 = 0.7;
const WEIGHT_PATH_FRAGMENT: f32 = 0.3;

impl QuickIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(
        &self,
        relative_path: &str,
        path: PathBuf,
        file_type: FileType,
        modified_at: i64,
        symbols: Vec<(String, usize)>,
    ) {
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        self.entries.insert(
            relative_path.to_string(),
            Entry { path, relative_path: relative_path.to_string(), file_type, modified_at, file_name, symbols },
        );
    }

    pub fn remove(&self, relative_path: &str) {
        self.entries.remove(relative_path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        file_types: Option<&[FileType]>,
        directory: Option<&str>,
        git_only: bool,
        recent_days: Option<u32>,
    ) -> Vec<QuickResult> {
        let needle = query.to_ascii_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);

        let mut scored: Vec<QuickResult> = Vec::new();
        for entry in self.entries.iter() {
            let entry = entry.value();

            if let Some(types) = file_types {
                if !types.contains(&entry.file_type) {
                    continue;
                }
            }
            if let Some(dir) = directory {
                if !entry.relative_path.starts_with(dir) {
                    continue;
                }
            }
            if git_only && !crate::git::is_tracked(&entry.path) {
                continue;
            }
            if let Some(days) = recent_days {
                if now - entry.modified_at > days as i64 * 86_400 {
                    continue;
                }
            }

            let file_name_lower = entry.file_name.to_ascii_lowercase();
            let mut score = 0.0f32;
            let mut matched_symbol: Option<(String, usize)> = None;

            if file_name_lower == needle {
                score += WEIGHT_EXACT_FILENAME;
            } else if file_name_lower.contains(&needle) {
                score += WEIGHT_FILENAME_FRAGMENT;
            }

            for (name, line) in &entry.symbols {
                if name.to_ascii_lowercase().contains(&needle) {
                    score += WEIGHT_SYMBOL_MATCH;
                    matched_symbol = Some((name.clone(), *line));
                    break;
                }
            }

            if entry.relative_path.to_ascii_lowercase().contains(&needle) {
                score += WEIGHT_PATH_FRAGMENT;
            }

            if score <= 0.0 {
                continue;
            }

            scored.push(QuickResult {
                path: entry.path.to_string_lossy().to_string(),
                relative_path: entry.relative_path.clone(),
                name: matched_symbol.as_ref().map(|(n, _)| n.clone()),
                line_number: matched_symbol.map(|(_, l)| l),
                score,
                modified_at: entry.modified_at,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.modified_at.cmp(&a.modified_at))
        });
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_filename_outranks_fragment() {
        let idx = QuickIndex::new();
        idx.upsert("auth.py", PathBuf::from("/r/auth.py"), FileType::Python, 0, vec![]);
        idx.upsert("authentication_helpers.py", PathBuf::from("/r/authentication_helpers.py"), FileType::Python, 0, vec![]);

        let results = idx.search("auth.py", 5, None, None, false, None);
        assert_eq!(results[0].relative_path, "auth.py");
    }

    #[test]
    fn filters_by_file_type() {
        let idx = QuickIndex::new();
        idx.upsert("a.py", PathBuf::from("/r/a.py"), FileType::Python, 0, vec![]);
        idx.upsert("a.md", PathBuf::from("/r/a.md"), FileType::Markdown, 0, vec![]);

        let results = idx.search("a", 5, Some(&[FileType::Markdown]), None, false, None);
        assert!(results.iter().all(|r| r.relative_path.ends_with(".md")));
    }

    #[test]
    fn symbol_match_surfaces_line_number() {
        let idx = QuickIndex::new();
        idx.upsert("auth.py", PathBuf::from("/r/auth.py"), FileType::Python, 0, vec![("login".to_string(), 12)]);
        let results = idx.search("login", 5, None, None, false, None);
        assert_eq!(results[0].line_number, Some(12));
    }

    #[test]
    fn remove_drops_entry_from_results() {
        let idx = QuickIndex::new();
        idx.upsert("auth.py", PathBuf::from("/r/auth.py"), FileType::Python, 0, vec![]);
        idx.remove("auth.py");
        assert!(idx.search("auth", 5, None, None, false, None).is_empty());
    }
}
