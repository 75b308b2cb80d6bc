//! In-memory [`EmbeddingStore`] implementation for tests and offline use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Queries
//! are brute-force cosine scans over all stored vectors. Nothing persists
//! past the process.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::embed::{cosine_distance, embed_one, Embedder};
use crate::models::{ParagraphEntry, QueryHit, StoreStats};

use super::EmbeddingStore;

struct StoredEntry {
    text: String,
    metadata: crate::models::ParagraphMetadata,
    vector: Vec<f32>,
}

pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            embedder,
        }
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entries: &[ParagraphEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let mut stored = self.entries.write().unwrap();
        for (entry, vector) in entries.iter().zip(vectors.into_iter()) {
            stored.insert(
                entry.id.clone(),
                StoredEntry {
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    vector,
                },
            );
        }

        Ok(entries.len())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 || self.entries.read().unwrap().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), text).await?;

        let stored = self.entries.read().unwrap();
        let mut hits: Vec<QueryHit> = stored
            .iter()
            .map(|(id, entry)| QueryHit {
                id: id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                distance: cosine_distance(&query_vec, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            backend: "memory".to_string(),
            total_entries: self.entries.read().unwrap().len(),
            metric: "cosine".to_string(),
            storage_path: None,
            collection: None,
            index: None,
            dims: Some(self.embedder.dims()),
        })
    }
}
