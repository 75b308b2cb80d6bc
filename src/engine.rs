//! Continuity engine facade.
//!
//! [`ContinuityEngine`] owns the configured store and analyst and exposes
//! the caller-facing operations: corpus indexing, ad-hoc document
//! indexing, similar-passage lookup, continuity checks (full report or UI
//! summary), stats, and clearing. The CLI is a thin wrapper around this
//! type; library callers use it directly.

use anyhow::Result;
use std::path::Path;

use crate::analyst::{create_analyst, Analyst};
use crate::checker;
use crate::config::Config;
use crate::embed::create_embedder;
use crate::index;
use crate::models::{ConsistencyReport, IndexReport, RelatedSection, StoreStats};
use crate::report::{format_for_ui, UiSummary};
use crate::store::{create_store, EmbeddingStore};

pub struct ContinuityEngine {
    config: Config,
    store: Box<dyn EmbeddingStore>,
    analyst: Option<Box<dyn Analyst>>,
}

impl ContinuityEngine {
    /// Build an engine from configuration: embedder, then store (with
    /// remote→local fallback), then analyst. The one place backend
    /// selection happens.
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let store = create_store(&config, embedder).await?;
        let analyst = create_analyst(&config.analyst)?;

        Ok(Self {
            config,
            store,
            analyst,
        })
    }

    /// Assemble an engine from pre-built parts. Used by tests and callers
    /// that construct their own store or analyst.
    pub fn with_parts(
        config: Config,
        store: Box<dyn EmbeddingStore>,
        analyst: Option<Box<dyn Analyst>>,
    ) -> Self {
        Self {
            config,
            store,
            analyst,
        }
    }

    /// Identifier of the selected store backend.
    pub fn backend(&self) -> &str {
        self.store.backend()
    }

    /// Index every matching document under `dir`. See [`index::index_corpus`].
    pub async fn index_corpus(&self, dir: &Path) -> Result<IndexReport> {
        index::index_corpus(self.store.as_ref(), &self.config.indexing, dir).await
    }

    /// Index one already-extracted document. `min_words` falls back to the
    /// configured indexing threshold when not given.
    pub async fn index_document(
        &self,
        name: &str,
        text: &str,
        min_words: Option<usize>,
    ) -> Result<usize> {
        let min_words = min_words.unwrap_or(self.config.indexing.min_words);
        index::index_document(self.store.as_ref(), name, text, min_words).await
    }

    /// Find indexed passages similar to `text`, filtered to similarity ≥
    /// `threshold` (configured default when `None`). An empty corpus
    /// yields an empty list.
    pub async fn find_similar(
        &self,
        text: &str,
        limit: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<RelatedSection>> {
        let threshold = threshold.unwrap_or(self.config.retrieval.similar_threshold);

        if self.store.count().await? == 0 {
            return Ok(Vec::new());
        }

        let hits = self.store.query(text, limit).await?;
        Ok(checker::to_related_sections(&hits)
            .into_iter()
            .filter(|s| s.similarity >= threshold)
            .collect())
    }

    /// Check a new passage against the indexed corpus. Never fails — every
    /// failure mode is folded into the report's status.
    pub async fn check_continuity(&self, new_text: &str) -> ConsistencyReport {
        checker::check_continuity(
            self.store.as_ref(),
            self.analyst.as_deref(),
            &self.config.retrieval,
            new_text,
        )
        .await
    }

    /// Check a new passage and reduce the result to a UI summary.
    pub async fn check_continuity_for_ui(&self, new_text: &str) -> UiSummary {
        format_for_ui(&self.check_continuity(new_text).await)
    }

    /// Store backend descriptor and entry count.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Remove every indexed paragraph.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete_all().await
    }
}
