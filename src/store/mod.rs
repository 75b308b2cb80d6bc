//! Embedding store abstraction for driftcheck.
//!
//! The [`EmbeddingStore`] trait defines the five operations the indexing
//! pipeline and continuity checker need, enabling interchangeable backends:
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | local | [`local`] | SQLite file under `store.data_dir` |
//! | remote | [`remote`] | cloud vector-index service |
//! | memory | [`memory`] | none (tests, offline development) |
//!
//! All backends expose cosine distance (lower = closer), so no caller ever
//! branches on backend identity. Backend selection happens once, in
//! [`create_store`].

pub mod local;
pub mod memory;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embed::Embedder;
use crate::models::{ParagraphEntry, QueryHit, StoreStats};

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Abstract embedding-backed similarity store.
///
/// Implementations must satisfy identical pre/postconditions:
/// - `upsert` replaces any entry sharing an id (count unchanged on
///   replacement) and returns the number of entries written;
/// - `query` returns up to `k` entries ordered ascending by distance, and
///   returns an empty vector — not an error — when the store is empty;
/// - `delete_all` is idempotent.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Short backend identifier (`"local"`, `"remote"`, `"memory"`).
    fn backend(&self) -> &str;

    /// Insert new entries or replace entries sharing an existing id.
    async fn upsert(&self, entries: &[ParagraphEntry]) -> Result<usize>;

    /// Return up to `k` nearest entries for `text`, ascending by distance.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>>;

    /// Exact number of stored entries.
    async fn count(&self) -> Result<usize>;

    /// Remove all entries. Idempotent.
    async fn delete_all(&self) -> Result<()>;

    /// Backend descriptor: identity, totals, and backend-specific facts.
    async fn stats(&self) -> Result<StoreStats>;
}

/// Select and construct the embedding store for this configuration.
///
/// The remote backend is attempted iff `[store.remote]` is configured and
/// its API key is present in the environment. Any remote construction
/// failure is logged and falls back to the local backend, transparently to
/// all downstream code. The caller owns the returned store; there is no
/// process-wide instance.
pub async fn create_store(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<Box<dyn EmbeddingStore>> {
    if let Some(remote_cfg) = &config.store.remote {
        if let Some(api_key) = remote_cfg.api_key() {
            match RemoteStore::connect(remote_cfg, api_key, Arc::clone(&embedder)).await {
                Ok(store) => {
                    info!(index = %remote_cfg.index, "using remote vector index");
                    return Ok(Box::new(store));
                }
                Err(e) => {
                    warn!("remote vector index unavailable, falling back to local: {e:#}");
                }
            }
        }
    }

    let store = LocalStore::open(&config.store, embedder).await?;
    info!(path = %store.storage_path().display(), "using local vector store");
    Ok(Box::new(store))
}
