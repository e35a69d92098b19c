//! Batched HTTP client for the embedding backend (SPEC_FULL.md §4.3, §6).

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    dim: usize,
    max_retries: u32,
}

impl EmbeddingClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dim: usize) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            endpoint: endpoint.into(),
            model: model.into(),
            dim,
            max_retries: 3,
        }
    }

    /// Embeds a single query string.
    pub async fn embed_query(&self, text: &str) -> EngineResult<Vec<f32>> {
        let matrix = self.embed_batch(&[text.to_string()]).await?;
        matrix.into_iter().next().ok_or_else(|| EngineError::backend_protocol("empty embedding response"))
    }

    /// Embeds a batch of non-empty texts. An empty batch short-circuits
    /// without calling the backend.
    pub async fn embed_batch(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        loop {
            match self.try_embed(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.kind() == crate::error::ErrorKind::BackendProtocol => return Err(e),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(attempt, error = %e, "embedding request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn try_embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let request = EmbedRequest { model: &self.model, input: texts };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::backend_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::backend_unavailable(format!("embedding backend returned {}", response.status())));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EngineError::backend_protocol(format!("malformed embedding response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EngineError::backend_protocol(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.dim {
                return Err(EngineError::backend_protocol(format!(
                    "expected dimension {}, got {}",
                    self.dim,
                    vector.len()
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::backend_protocol("embedding contains non-finite values"));
            }
        }

        Ok(parsed.embeddings.into_iter().map(normalize).collect())
    }
}

/// L2-normalizes a vector so cosine similarity reduces to a dot product.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let client = EmbeddingClient::new("http://localhost:1/unused", "nomic-embed-text", 4);
        let out = client.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        let v = normalize(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
