//! Corpus indexing pipeline.
//!
//! Walks a directory of draft documents, extracts paragraphs, builds
//! deterministic per-paragraph identifiers, and upserts them into the
//! embedding store. Identifiers are a pure function of the document stem
//! and paragraph ordinal, so re-indexing an unchanged document rewrites
//! the same entries instead of appending duplicates.
//!
//! Per-file failures (unreadable files, nothing meeting the word
//! threshold, a failed upsert) are recorded in the report and never abort
//! the remaining files — partial success is the normal outcome.

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::IndexingConfig;
use crate::extract::{extract_paragraphs, word_count};
use crate::models::{FileReport, IndexReport, ParagraphEntry, ParagraphMetadata};
use crate::store::EmbeddingStore;

/// Deterministic paragraph id: `"{document_stem}_para_{ordinal}"`.
pub fn paragraph_id(stem: &str, ordinal: usize) -> String {
    format!("{}_para_{}", stem, ordinal)
}

/// Index every matching document under `dir`.
///
/// A missing directory is created and reported as `waiting_for_content`
/// rather than an error, so a fresh project starts cleanly.
pub async fn index_corpus(
    store: &dyn EmbeddingStore,
    config: &IndexingConfig,
    dir: &Path,
) -> Result<IndexReport> {
    let mut report = IndexReport {
        success: false,
        timestamp: Utc::now(),
        waiting_for_content: false,
        backend: store.backend().to_string(),
        total_files: 0,
        total_paragraphs: 0,
        total_words: 0,
        files: Vec::new(),
    };

    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        report.waiting_for_content = true;
        return Ok(report);
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut paths: Vec<std::path::PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            let relative = p.strip_prefix(dir).unwrap_or(p);
            include_set.is_match(relative)
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        report.waiting_for_content = true;
        return Ok(report);
    }

    for path in &paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.clone());

        let mut file_report = FileReport {
            filename: filename.clone(),
            chapter: stem.clone(),
            paragraphs: 0,
            words: 0,
            error: None,
        };

        match index_file(store, config.min_words, path, &stem, &filename).await {
            Ok((paragraphs, words)) if paragraphs > 0 => {
                file_report.paragraphs = paragraphs;
                file_report.words = words;
                report.total_files += 1;
                report.total_paragraphs += paragraphs;
                report.total_words += words;
            }
            Ok(_) => {
                file_report.error = Some(format!(
                    "no paragraphs of at least {} words",
                    config.min_words
                ));
            }
            Err(e) => {
                warn!(file = %filename, "indexing failed: {e:#}");
                file_report.error = Some(format!("{e:#}"));
            }
        }

        report.files.push(file_report);
    }

    report.success = report.total_paragraphs > 0;
    Ok(report)
}

async fn index_file(
    store: &dyn EmbeddingStore,
    min_words: usize,
    path: &Path,
    stem: &str,
    filename: &str,
) -> Result<(usize, usize)> {
    let text = std::fs::read_to_string(path)?;
    let paragraphs = extract_paragraphs(&text, min_words);
    if paragraphs.is_empty() {
        return Ok((0, 0));
    }

    let entries = build_entries(stem, filename, paragraphs);
    let words = entries.iter().map(|e| e.metadata.word_count).sum();
    let written = store.upsert(&entries).await?;

    Ok((written, words))
}

/// Index a single already-extracted document.
///
/// The id scheme and metadata are identical to [`index_corpus`], so an
/// ad-hoc pass over one document and a full corpus pass never disagree
/// about an unchanged paragraph's identity. Returns the number of
/// paragraphs written.
pub async fn index_document(
    store: &dyn EmbeddingStore,
    name: &str,
    text: &str,
    min_words: usize,
) -> Result<usize> {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());

    let paragraphs = extract_paragraphs(text, min_words);
    if paragraphs.is_empty() {
        return Ok(0);
    }

    let entries = build_entries(&stem, name, paragraphs);
    store.upsert(&entries).await
}

fn build_entries(stem: &str, source_file: &str, paragraphs: Vec<String>) -> Vec<ParagraphEntry> {
    let indexed_at = Utc::now().to_rfc3339();

    paragraphs
        .into_iter()
        .enumerate()
        .map(|(i, text)| ParagraphEntry {
            id: paragraph_id(stem, i),
            metadata: ParagraphMetadata {
                source_file: source_file.to_string(),
                chapter: stem.to_string(),
                paragraph_index: i,
                word_count: word_count(&text),
                char_count: text.len(),
                indexed_at: indexed_at.clone(),
            },
            text,
        })
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashedEmbedder;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(HashedEmbedder::new(32)))
    }

    fn config() -> IndexingConfig {
        IndexingConfig::default()
    }

    #[test]
    fn test_paragraph_id_deterministic() {
        assert_eq!(paragraph_id("ch1", 0), "ch1_para_0");
        assert_eq!(paragraph_id("ch1", 7), "ch1_para_7");
    }

    #[tokio::test]
    async fn test_index_single_paragraph_document() {
        let store = store();
        let count = index_document(&store, "ch1.md", &words(25), 15).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.query(&words(25), 1).await.unwrap();
        assert_eq!(hits[0].id, "ch1_para_0");
        assert_eq!(hits[0].metadata.chapter, "ch1");
        assert_eq!(hits[0].metadata.word_count, 25);
    }

    #[tokio::test]
    async fn test_reindex_same_document_is_idempotent() {
        let store = store();
        let text = format!("{}\n\n{}", words(20), words(30));
        index_document(&store, "ch1.md", &text, 15).await.unwrap();
        index_document(&store, "ch1.md", &text, 15).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_min_words_override() {
        let store = store();
        let text = format!("{}\n\n{}", words(17), words(25));
        let count = index_document(&store, "notes.md", &text, 20).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_waits_for_content() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("drafts");
        let store = store();

        let report = index_corpus(&store, &config(), &missing).await.unwrap();
        assert!(report.waiting_for_content);
        assert!(!report.success);
        assert_eq!(report.total_files, 0);
        assert!(missing.exists());
    }

    #[tokio::test]
    async fn test_empty_directory_waits_for_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let report = index_corpus(&store, &config(), tmp.path()).await.unwrap();
        assert!(report.waiting_for_content);
    }

    #[tokio::test]
    async fn test_corpus_indexing_counts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("ch1.md"),
            format!("{}\n\n{}", words(20), words(30)),
        )
        .unwrap();
        std::fs::write(tmp.path().join("ch2.md"), words(18)).unwrap();
        // Below every threshold; contributes nothing.
        std::fs::write(tmp.path().join("stub.md"), "too short").unwrap();
        // Not matched by the include globs.
        std::fs::write(tmp.path().join("image.png"), "binary-ish").unwrap();

        let store = store();
        let report = index_corpus(&store, &config(), tmp.path()).await.unwrap();

        assert!(report.success);
        assert!(!report.waiting_for_content);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.total_paragraphs, 3);
        assert_eq!(report.total_words, 68);
        assert_eq!(store.count().await.unwrap(), 3);

        // The stub file is recorded with an error, not dropped silently.
        let stub = report.files.iter().find(|f| f.filename == "stub.md").unwrap();
        assert!(stub.error.is_some());
        assert!(report.files.iter().all(|f| f.filename != "image.png"));
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_abort_pass() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.md"), [0xff, 0xfe, 0x80]).unwrap();
        std::fs::write(tmp.path().join("good.md"), words(20)).unwrap();

        let store = store();
        let report = index_corpus(&store, &config(), tmp.path()).await.unwrap();

        assert!(report.success);
        assert_eq!(report.total_files, 1);
        let bad = report.files.iter().find(|f| f.filename == "bad.md").unwrap();
        assert!(bad.error.is_some());
    }
}
