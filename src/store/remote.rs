//! Cloud vector-index backend.
//!
//! Talks JSON-over-HTTP to a hosted similarity service. Embeddings are
//! computed client-side (the index is created with the embedder's
//! dimension, cosine metric), and upserts are chunked into fixed-size
//! batches to respect the service's payload limits.
//!
//! The service only retains compact metadata per vector, so each entry's
//! remote metadata carries a truncated text preview plus a SHA-256 content
//! hash, while a process-local cache maps id → full text and id → full
//! metadata. Query results resolve through the cache first and fall back
//! to the preview for entries indexed by another process.
//!
//! The service scores matches with a similarity in ~[0, 1] (higher =
//! closer); this backend converts it to `distance = 1 − similarity` so
//! callers see the same "lower is closer" convention as the local backend.
//!
//! # Retry strategy
//!
//! HTTP 429 and 5xx responses and network errors are retried with
//! exponential backoff (1s, 2s, 4s, …, exponent capped at 2^5); other 4xx
//! responses fail immediately with the status and body in the error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::embed::{embed_one, Embedder};
use crate::models::{ParagraphEntry, ParagraphMetadata, QueryHit, StoreStats};

use super::EmbeddingStore;

/// Characters of full text kept in remote metadata.
const PREVIEW_CHARS: usize = 500;

pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    embedder: Arc<dyn Embedder>,
    text_cache: RwLock<HashMap<String, String>>,
    meta_cache: RwLock<HashMap<String, ParagraphMetadata>>,
}

impl RemoteStore {
    /// Connect to the service, creating the index if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the service is unreachable, the index cannot be created,
    /// or an existing index's dimension does not match the embedder's —
    /// a mismatch would silently corrupt similarity scores.
    pub async fn connect(
        config: &RemoteConfig,
        api_key: String,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let store = Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            embedder,
            text_cache: RwLock::new(HashMap::new()),
            meta_cache: RwLock::new(HashMap::new()),
        };

        store.ensure_index().await?;
        Ok(store)
    }

    async fn ensure_index(&self) -> Result<()> {
        let listing = self.get_json("/indexes").await?;
        let existing = listing
            .get("indexes")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();

        for idx in &existing {
            if idx.get("name").and_then(|n| n.as_str()) == Some(self.index.as_str()) {
                let dimension = idx.get("dimension").and_then(|d| d.as_u64()).unwrap_or(0);
                if dimension as usize != self.embedder.dims() {
                    bail!(
                        "Remote index '{}' has dimension {} but the embedding model produces {}",
                        self.index,
                        dimension,
                        self.embedder.dims()
                    );
                }
                return Ok(());
            }
        }

        self.post_json(
            "/indexes",
            &json!({
                "name": self.index,
                "dimension": self.embedder.dims(),
                "metric": "cosine",
            }),
        )
        .await?;

        Ok(())
    }

    /// POST with retry/backoff per the module-level strategy.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        if response.content_length() == Some(0) {
                            return Ok(Value::Null);
                        }
                        return Ok(response.json().await.unwrap_or(Value::Null));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Vector index error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Vector index error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Vector index request failed after retries")))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .get(&url)
                .header("Api-Key", &self.api_key)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Vector index error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Vector index error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Vector index request failed after retries")))
    }

    fn index_path(&self, suffix: &str) -> String {
        format!("/indexes/{}{}", self.index, suffix)
    }
}

fn text_preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[async_trait]
impl EmbeddingStore for RemoteStore {
    fn backend(&self) -> &str {
        "remote"
    }

    async fn upsert(&self, entries: &[ParagraphEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let mut vectors = Vec::with_capacity(entries.len());
        for (entry, embedding) in entries.iter().zip(embeddings.iter()) {
            // The service caps metadata size, so ship a preview + hash and
            // keep the full text in the process-local cache.
            let mut metadata = serde_json::to_value(&entry.metadata)?;
            if let Some(obj) = metadata.as_object_mut() {
                obj.insert("text_preview".to_string(), json!(text_preview(&entry.text)));
                obj.insert("text_hash".to_string(), json!(content_hash(&entry.text)));
            }

            vectors.push(json!({
                "id": entry.id,
                "values": embedding,
                "metadata": metadata,
            }));
        }

        for batch in vectors.chunks(self.batch_size) {
            self.post_json(&self.index_path("/vectors/upsert"), &json!({ "vectors": batch }))
                .await?;
        }

        {
            let mut texts = self.text_cache.write().unwrap();
            let mut metas = self.meta_cache.write().unwrap();
            for entry in entries {
                texts.insert(entry.id.clone(), entry.text.clone());
                metas.insert(entry.id.clone(), entry.metadata.clone());
            }
        }

        Ok(entries.len())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), text).await?;

        let response = self
            .post_json(
                &self.index_path("/query"),
                &json!({
                    "vector": query_vec,
                    "top_k": k,
                    "include_metadata": true,
                }),
            )
            .await?;

        let matches = response
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let texts = self.text_cache.read().unwrap();
        let metas = self.meta_cache.read().unwrap();

        let mut hits = Vec::with_capacity(matches.len());
        for m in &matches {
            let id = m
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or_default()
                .to_string();
            let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
            let metadata_value = m.get("metadata").cloned().unwrap_or(Value::Null);

            let full_text = texts.get(&id).cloned().unwrap_or_else(|| {
                metadata_value
                    .get("text_preview")
                    .and_then(|p| p.as_str())
                    .unwrap_or_default()
                    .to_string()
            });

            let metadata = metas.get(&id).cloned().unwrap_or_else(|| {
                serde_json::from_value(metadata_value.clone()).unwrap_or_default()
            });

            hits.push(QueryHit {
                id,
                text: full_text,
                metadata,
                // The service reports similarity (higher = closer); flip it
                // to the shared distance convention.
                distance: (1.0 - score) as f32,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let stats = self.get_json(&self.index_path("/stats")).await?;
        Ok(stats
            .get("total_vector_count")
            .and_then(|c| c.as_u64())
            .unwrap_or(0) as usize)
    }

    async fn delete_all(&self) -> Result<()> {
        self.post_json(&self.index_path("/vectors/delete"), &json!({ "delete_all": true }))
            .await?;
        self.text_cache.write().unwrap().clear();
        self.meta_cache.write().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let stats = self.get_json(&self.index_path("/stats")).await?;
        let total = stats
            .get("total_vector_count")
            .and_then(|c| c.as_u64())
            .unwrap_or(0) as usize;
        let dims = stats
            .get("dimension")
            .and_then(|d| d.as_u64())
            .map(|d| d as usize)
            .unwrap_or_else(|| self.embedder.dims());

        Ok(StoreStats {
            backend: "remote".to_string(),
            total_entries: total,
            metric: "cosine".to_string(),
            storage_path: None,
            collection: None,
            index: Some(self.index.clone()),
            dims: Some(dims),
        })
    }
}
