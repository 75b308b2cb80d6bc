//! Self-contained SQLite-backed embedding store.
//!
//! Computes embeddings through the configured [`Embedder`] and persists
//! entries (text, metadata JSON, vector BLOB) in a single SQLite table
//! under `store.data_dir`. Queries are brute-force cosine scans over the
//! stored vectors — fine at paragraph-corpus scale.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::embed::{blob_to_vec, cosine_distance, embed_one, vec_to_blob, Embedder};
use crate::models::{ParagraphEntry, QueryHit, StoreStats};

use super::EmbeddingStore;

pub struct LocalStore {
    pool: SqlitePool,
    db_path: PathBuf,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl LocalStore {
    /// Open (or create) the store under `config.data_dir`.
    ///
    /// The database file is named after the collection; the schema is
    /// created if missing, so opening is idempotent.
    pub async fn open(config: &StoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.data_dir.join(format!("{}.sqlite", config.collection));

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paragraphs (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            db_path,
            collection: config.collection.clone(),
            embedder,
        })
    }

    pub fn storage_path(&self) -> &std::path::Path {
        &self.db_path
    }
}

#[async_trait]
impl EmbeddingStore for LocalStore {
    fn backend(&self) -> &str {
        "local"
    }

    async fn upsert(&self, entries: &[ParagraphEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (entry, vector) in entries.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&entry.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO paragraphs (id, text, metadata_json, embedding, model, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(entries.len())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), text).await?;

        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM paragraphs")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                QueryHit {
                    id: row.get("id"),
                    text: row.get("text"),
                    metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                    distance: cosine_distance(&query_vec, &vector),
                }
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
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paragraphs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM paragraphs")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            backend: "local".to_string(),
            total_entries: self.count().await?,
            metric: "cosine".to_string(),
            storage_path: Some(self.db_path.display().to_string()),
            collection: Some(self.collection.clone()),
            index: None,
            dims: Some(self.embedder.dims()),
        })
    }
}
