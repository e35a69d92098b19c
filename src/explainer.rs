//! Pure, side-effect-free relevance attribution (SPEC_FULL.md §4.9).

use crate::types::ChunkType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonType {
    ExactTerm,
    FilenameMatch,
    SymbolMatch,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReason {
    pub reason_type: ReasonType,
    pub weight: f32,
    pub evidence: String,
}

pub struct Explainer;

impl Explainer {
    /// Attributes `relevance` to concrete reasons. Always includes the
    /// semantic reason (every result came from the ANN index); adds lexical
    /// reasons when the query's terms literally appear in the path, name, or
    /// preview.
    pub fn explain(
        query: &str,
        preview: &str,
        relative_path: &str,
        chunk_name: Option<&str>,
        chunk_type: ChunkType,
        relevance: f32,
    ) -> (Vec<MatchReason>, String) {
        let mut reasons = Vec::new();
        let needle = query.to_ascii_lowercase();
        let terms: Vec<&str> = needle.split_whitespace().collect();

        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path).to_ascii_lowercase();
        if !needle.is_empty() && file_name.contains(&needle) {
            reasons.push(MatchReason {
                reason_type: ReasonType::FilenameMatch,
                weight: 0.3,
                evidence: format!("filename contains \"{query}\""),
            });
        }

        if let Some(name) = chunk_name {
            if !needle.is_empty() && name.to_ascii_lowercase().contains(&needle) {
                reasons.push(MatchReason {
                    reason_type: ReasonType::SymbolMatch,
                    weight: 0.3,
                    evidence: format!("{} name \"{name}\" matches query", chunk_type.as_str()),
                });
            }
        }

        let preview_lower = preview.to_ascii_lowercase();
        let matched_terms: Vec<&str> = terms.iter().filter(|t| preview_lower.contains(**t)).copied().collect();
        if !matched_terms.is_empty() {
            reasons.push(MatchReason {
                reason_type: ReasonType::ExactTerm,
                weight: 0.2 * matched_terms.len() as f32,
                evidence: format!("preview contains term(s): {}", matched_terms.join(", ")),
            });
        }

        reasons.push(MatchReason {
            reason_type: ReasonType::Semantic,
            weight: relevance,
            evidence: "semantic similarity to query embedding".to_string(),
        });

        let summary = if let Some(top) = reasons.iter().max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap()) {
            top.evidence.clone()
        } else {
            "no match reasons".to_string()
        };

        (reasons, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_includes_semantic_reason() {
        let (reasons, _) = Explainer::explain("auth", "some code", "lib.rs", None, ChunkType::WholeFile, 0.5);
        assert!(reasons.iter().any(|r| r.reason_type == ReasonType::Semantic));
    }

    #[test]
    fn filename_match_adds_reason() {
        let (reasons, _) = Explainer::explain("auth", "code", "src/auth.py", None, ChunkType::WholeFile, 0.5);
        assert!(reasons.iter().any(|r| r.reason_type == ReasonType::FilenameMatch));
    }

    #[test]
    fn symbol_match_adds_reason() {
        let (reasons, _) = Explainer::explain("login", "code", "src/x.py", Some("login_user"), ChunkType::Function, 0.5);
        assert!(reasons.iter().any(|r| r.reason_type == ReasonType::SymbolMatch));
    }
}
