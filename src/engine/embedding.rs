// ── Mnemo Engine: Embedding Gateway ────────────────────────────────────────
// Calls Ollama or OpenAI-compatible embedding APIs to produce vector
// representations of text. On any remote failure, falls back to a
// deterministic hash-based pseudo-embedding so storage and deduplication
// keep working while the embedder is down. The fallback is diagnostic, not
// semantic: nearest-neighbour results are only meaningful for identical or
// near-identical texts.

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::MemoryEngineConfig;
use crate::engine::http::truncate_utf8;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub struct EmbedGateway {
    client: Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl EmbedGateway {
    pub fn new(config: &MemoryEngineConfig) -> Self {
        EmbedGateway {
            client: Client::new(),
            base_url: config.embedding_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            dims: config.embedding_dims,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Get an embedding vector for a text string. Never fails: remote
    /// errors degrade to the deterministic fallback.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.embed_remote(text).await {
            Ok(vec) => vec,
            Err(e) => {
                warn!("[embed] Remote embedding failed, using hash fallback: {}", e);
                hash_embedding(text, self.dims)
            }
        }
    }

    /// Remote-only embed, surfacing the error. Used by the startup probe.
    pub async fn embed_remote(&self, text: &str) -> MemoryResult<Vec<f32>> {
        // Try Ollama format first, then OpenAI-compatible.
        let ollama_err = match self.embed_ollama(text).await {
            Ok(vec) => return Ok(vec),
            Err(e) => e,
        };

        match self.embed_openai(text).await {
            Ok(vec) => Ok(vec),
            Err(openai_err) => Err(MemoryError::provider(
                "embedding",
                format!("Ollama: {} | OpenAI: {}", ollama_err, openai_err),
            )),
        }
    }

    /// Check the embedding service is reachable and the model responds.
    /// Returns the vector dimensionality on success.
    pub async fn test_connection(&self) -> MemoryResult<usize> {
        let vec = self.embed_remote("connection probe").await?;
        Ok(vec.len())
    }

    /// Ollama API: POST /api/embed { model, input } → { embeddings: [[f32...]] }
    async fn embed_ollama(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MemoryError::provider(
                "embedding",
                format!("Ollama embed {} {}", status, truncate_utf8(&text, 200)),
            ));
        }

        let v: Value = resp.json().await?;
        // Newer Ollama returns { embeddings: [[...]] }, older { embedding: [...] }.
        let values = v["embeddings"][0]
            .as_array()
            .or_else(|| v["embedding"].as_array())
            .ok_or_else(|| MemoryError::provider("embedding", "no embedding array in response"))?;
        let vec: Vec<f32> = values
            .iter()
            .filter_map(|n| n.as_f64().map(|f| f as f32))
            .collect();
        if vec.is_empty() {
            return Err(MemoryError::provider("embedding", "empty embedding vector"));
        }
        Ok(vec)
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }
    async fn embed_openai(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MemoryError::provider(
                "embedding",
                format!("OpenAI embed {} {}", status, truncate_utf8(&text, 200)),
            ));
        }

        let v: Value = resp.json().await?;
        let values = v["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| MemoryError::provider("embedding", "no data[0].embedding array"))?;
        let vec: Vec<f32> = values
            .iter()
            .filter_map(|n| n.as_f64().map(|f| f as f32))
            .collect();
        if vec.is_empty() {
            return Err(MemoryError::provider("embedding", "empty embedding vector"));
        }
        Ok(vec)
    }
}

// ── Deterministic hash fallback ────────────────────────────────────────────

/// Deterministic pseudo-embedding: each whitespace token is hashed into a
/// bucket with a sign bit, the bucket counts are L2-normalised. Identical
/// texts always map to identical vectors, so dedup keeps working offline.
pub fn hash_embedding(text: &str, dims: usize) -> Vec<f32> {
    let dims = dims.max(1);
    let mut accum = vec![0.0f32; dims];
    let mut any = false;

    for token in text.split_whitespace() {
        let normalized = token.to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        accum[bucket % dims] += sign;
        any = true;
    }

    if !any {
        debug!("[embed] hash fallback on empty text");
        return accum;
    }

    let norm: f32 = accum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-8 {
        for x in accum.iter_mut() {
            *x /= norm;
        }
    }
    accum
}

/// Cosine similarity between two vectors. Returns 0.0 on length mismatch
/// or zero-length input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (fx, fy) = (*x as f64, *y as f64);
        dot += fx * fy;
        norm_a += fx * fx;
        norm_b += fy * fy;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic() {
        let a = hash_embedding("the user prefers dark mode", 128);
        let b = hash_embedding("the user prefers dark mode", 128);
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn hash_embedding_distinguishes_texts() {
        let a = hash_embedding("rust is a systems language", 256);
        let b = hash_embedding("the weather is nice today", 256);
        assert!(cosine_similarity(&a, &b) < 0.9);
        assert!(cosine_similarity(&a, &a) > 0.999);
    }

    #[test]
    fn hash_embedding_is_unit_length() {
        let v = hash_embedding("alpha beta gamma", 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedding_empty_text_is_zero_vector() {
        let v = hash_embedding("   ", 32);
        assert_eq!(v.len(), 32);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn hash_embedding_case_insensitive_tokens() {
        let a = hash_embedding("Rust Memory", 64);
        let b = hash_embedding("rust memory", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn cosine_basic_properties() {
        let x = vec![1.0, 0.0, 0.0];
        let y = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&x, &x) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&x, &y).abs() < 1e-6);
        assert_eq!(cosine_similarity(&x, &[]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
