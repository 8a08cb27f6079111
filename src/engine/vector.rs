// ── Mnemo Engine: Vector Gateway ───────────────────────────────────────────
// Adapter to the external vector database (Qdrant REST shapes).
//
// Responsibilities:
//   - collection bootstrap with cosine distance + keyword payload indices
//   - point upsert, filtered k-NN search, filter-based delete
//   - per-request timeout, capped-retry wrapper for transient failures
//
// The collection is shared by every agent and user; isolation is enforced
// in the payload via the `namespace`, `source_agent`, and `userId` keyword
// indices, never by collection-per-scope.

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::ScoredPoint;
use crate::atoms::types::MemoryEngineConfig;
use crate::engine::http::{backoff_delay, is_retryable_error, is_retryable_status, truncate_utf8};
use log::{debug, info, warn};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

/// Payload fields that get a keyword index at bootstrap.
const KEYWORD_INDEX_FIELDS: &[&str] = &["namespace", "source_agent", "source_type", "userId"];

/// A point ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

pub struct VectorGateway {
    client: Client,
    base_url: String,
    collection: String,
    vector_size: usize,
    timeout: Duration,
    max_retries: u32,
}

impl VectorGateway {
    pub fn new(config: &MemoryEngineConfig) -> Self {
        VectorGateway {
            client: Client::new(),
            base_url: format!("http://{}:{}", config.vector_host, config.vector_port),
            collection: config.vector_collection.clone(),
            vector_size: config.vector_size,
            timeout: Duration::from_secs(config.vector_timeout_secs),
            max_retries: config.vector_max_retries.max(1),
        }
    }

    // ── Collection bootstrap ───────────────────────────────────────────

    /// Create the collection if missing, then declare the keyword payload
    /// indices. Index creation failures are logged but not fatal: the
    /// index usually already exists.
    pub async fn ensure_collection(&self) -> MemoryResult<()> {
        let collection_url = format!("{}/collections/{}", self.base_url, self.collection);

        let exists = match self.request(Method::GET, &collection_url, None).await {
            Ok(_) => true,
            Err(MemoryError::Provider { message, .. }) if message.starts_with("404") => false,
            Err(e) => return Err(e),
        };

        if !exists {
            info!(
                "[vector] Creating collection '{}' (size {}, cosine)",
                self.collection, self.vector_size
            );
            let body = json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            });
            self.request(Method::PUT, &collection_url, Some(&body)).await?;
        }

        for field in KEYWORD_INDEX_FIELDS {
            let body = json!({ "field_name": field, "field_schema": "keyword" });
            let index_url = format!("{}/index", collection_url);
            if let Err(e) = self.request(Method::PUT, &index_url, Some(&body)).await {
                debug!("[vector] Index on '{}' not created: {}", field, e);
            }
        }

        Ok(())
    }

    // ── Point operations ───────────────────────────────────────────────

    pub async fn upsert(&self, points: &[VectorRecord]) -> MemoryResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
                .collect::<Vec<_>>()
        });
        self.request(Method::PUT, &url, Some(&body)).await?;
        debug!("[vector] Upserted {} points", points.len());
        Ok(())
    }

    /// Filtered k-NN search. Scores come back in [0, 1] (cosine); the
    /// caller applies its own minimum.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<Value>,
    ) -> MemoryResult<Vec<ScoredPoint>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter {
            body["filter"] = f;
        }
        let response = self.request(Method::POST, &url, Some(&body)).await?;

        let hits = response["result"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| {
                let id = match &hit["id"] {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let score = hit["score"].as_f64()? as f32;
                Some(ScoredPoint {
                    id,
                    score,
                    payload: hit["payload"].clone(),
                })
            })
            .collect();
        Ok(hits)
    }

    /// Delete every point matching the filter. Exposed for the tool
    /// surface; automatic flows never delete points.
    pub async fn delete_by_filter(&self, filter: Value) -> MemoryResult<()> {
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.base_url, self.collection
        );
        let body = json!({ "filter": filter });
        self.request(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }

    // ── Request wrapper ────────────────────────────────────────────────

    /// Send one request with timeout and capped retries. Only transient
    /// failures (connect/timeout transport errors, 429/5xx statuses) are
    /// retried; other HTTP errors surface immediately with the remote
    /// status code prefixed to the message.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> MemoryResult<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut req = self
                .client
                .request(method.clone(), url)
                .timeout(self.timeout);
            if let Some(b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.json::<Value>().await.unwrap_or_else(|_| json!({})));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) && attempt < self.max_retries {
                        let delay = backoff_delay(attempt);
                        warn!(
                            "[vector] {} {} → {} (attempt {}/{}), retrying in {:?}",
                            method, url, status, attempt, self.max_retries, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(status_error(status, &text));
                }
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "[vector] {} {} failed: {} (attempt {}/{}), retrying in {:?}",
                        method, url, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> MemoryError {
    let snippet = truncate_utf8(body, 200);
    MemoryError::provider("vector", format!("{} {}", status.as_u16(), snippet))
}

// ── Filter builders ────────────────────────────────────────────────────────
// The remote filter schema the core uses:
//   { "must": [ { "key": k, "match": { "value": v } }, ... ] }
// and for a multi-value OR within one field:
//   { "must": [ { "should": [ ...match conditions... ] } ] }

pub fn match_condition(key: &str, value: &str) -> Value {
    json!({ "key": key, "match": { "value": value } })
}

/// AND over exact-match conditions.
pub fn must_filter(pairs: &[(&str, &str)]) -> Value {
    let conditions: Vec<Value> = pairs.iter().map(|(k, v)| match_condition(k, v)).collect();
    json!({ "must": conditions })
}

/// AND over exact-match pairs, plus an OR over several values of one field.
pub fn must_filter_with_any(pairs: &[(&str, &str)], or_key: &str, or_values: &[&str]) -> Value {
    let mut conditions: Vec<Value> = pairs.iter().map(|(k, v)| match_condition(k, v)).collect();
    if !or_values.is_empty() {
        let should: Vec<Value> = or_values
            .iter()
            .map(|v| match_condition(or_key, v))
            .collect();
        conditions.push(json!({ "should": should }));
    }
    json!({ "must": conditions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_filter_shape() {
        let f = must_filter(&[("namespace", "agent_decisions"), ("userId", "default")]);
        assert_eq!(f["must"][0]["key"], "namespace");
        assert_eq!(f["must"][0]["match"]["value"], "agent_decisions");
        assert_eq!(f["must"][1]["key"], "userId");
    }

    #[test]
    fn or_within_field_nests_under_should() {
        let f = must_filter_with_any(
            &[("userId", "default")],
            "namespace",
            &["agent_decisions", "user_profile"],
        );
        assert_eq!(f["must"].as_array().unwrap().len(), 2);
        let should = f["must"][1]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[1]["match"]["value"], "user_profile");
    }

    #[test]
    fn empty_or_values_collapse_to_plain_must() {
        let f = must_filter_with_any(&[("userId", "default")], "namespace", &[]);
        assert_eq!(f["must"].as_array().unwrap().len(), 1);
    }
}
