//! End-to-end library tests: index a small corpus into the local store,
//! then run continuity checks against a scripted analyst.
//!
//! The hashed embedder keeps everything deterministic and offline.

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::sync::Arc;

use driftcheck::analyst::Analyst;
use driftcheck::config::Config;
use driftcheck::embed::HashedEmbedder;
use driftcheck::engine::ContinuityEngine;
use driftcheck::models::{CheckErrorKind, ReportStatus};
use driftcheck::store::LocalStore;
use tempfile::TempDir;

struct ScriptedAnalyst {
    response: String,
}

#[async_trait]
impl Analyst for ScriptedAnalyst {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }
}

fn test_config(root: &std::path::Path) -> Config {
    let content = format!(
        r#"
[store]
data_dir = "{}"

[embedding]
provider = "hashed"
dims = 64
"#,
        root.join("data").display()
    );
    toml::from_str(&content).unwrap()
}

async fn engine_with(tmp: &TempDir, analyst: Option<Box<dyn Analyst>>) -> ContinuityEngine {
    let config = test_config(tmp.path());
    let store = LocalStore::open(&config.store, Arc::new(HashedEmbedder::new(64)))
        .await
        .unwrap();
    ContinuityEngine::with_parts(config, Box::new(store), analyst)
}

fn write_corpus(root: &std::path::Path) -> std::path::PathBuf {
    let drafts = root.join("drafts");
    fs::create_dir_all(&drafts).unwrap();
    fs::write(
        drafts.join("ch1.md"),
        "The city deployed ten thousand networked cameras across its districts in 2019, \
         a rollout that reshaped both policing practice and public debate about oversight.\n\n\
         Municipal data retention for camera footage was capped at thirty days by ordinance, \
         a limit that advocacy groups considered the single most important safeguard adopted.",
    )
    .unwrap();
    fs::write(
        drafts.join("ch2.md"),
        "Smart city initiatives rely heavily on data analytics for governance decisions, \
         and the resulting dashboards became the primary interface between officials and streets.",
    )
    .unwrap();
    drafts
}

const CONSISTENT_RESPONSE: &str = r#"{
    "overall_score": 96,
    "issues": [],
    "terminology_analysis": {"new_terms": [], "potential_shifts": []},
    "summary": "No conflicts with established material."
}"#;

#[tokio::test]
async fn test_index_then_check_consistent() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(
        &tmp,
        Some(Box::new(ScriptedAnalyst {
            response: CONSISTENT_RESPONSE.to_string(),
        })),
    )
    .await;

    let report = engine.index_corpus(&drafts).await.unwrap();
    assert!(report.success);
    assert_eq!(report.total_files, 2);
    assert_eq!(report.total_paragraphs, 3);
    assert_eq!(engine.backend(), "local");

    let check = engine
        .check_continuity(
            "The city deployed ten thousand networked cameras across its districts in 2019, \
             a rollout that reshaped both policing practice and public debate about oversight.",
        )
        .await;

    assert_eq!(check.status, ReportStatus::Consistent);
    assert_eq!(check.overall_score, 96);
    assert!(!check.related_sections.is_empty());
    // The identical indexed paragraph is the nearest neighbor.
    let top = &check.related_sections[0];
    assert_eq!(top.source_file, "ch1.md");
    assert!(top.similarity > 0.99);

    let summary = engine
        .check_continuity_for_ui("The city deployed ten thousand networked cameras across its districts in 2019.")
        .await;
    assert_eq!(summary.score_label, "Excellent");
}

#[tokio::test]
async fn test_check_against_empty_store() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(
        &tmp,
        Some(Box::new(ScriptedAnalyst {
            response: CONSISTENT_RESPONSE.to_string(),
        })),
    )
    .await;

    let report = engine.check_continuity("anything").await;
    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.error.unwrap().kind, CheckErrorKind::EmptyIndex);
    assert!(report.related_sections.is_empty());
}

#[tokio::test]
async fn test_check_without_analyst() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(&tmp, None).await;
    engine.index_corpus(&drafts).await.unwrap();

    let report = engine.check_continuity("anything").await;
    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.error.unwrap().kind, CheckErrorKind::AnalystUnavailable);
}

#[tokio::test]
async fn test_critical_issue_surfaces_in_summary() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(
        &tmp,
        Some(Box::new(ScriptedAnalyst {
            response: r#"{
                "overall_score": 40,
                "issues": [{
                    "type": "contradiction",
                    "severity": "high",
                    "new_claim": "The city abandoned camera networks entirely.",
                    "existing_claim": "The city deployed ten thousand cameras in 2019.",
                    "source_file": "ch1.md",
                    "recommendation": "Reconcile the deployment history."
                }],
                "terminology_analysis": {"new_terms": [], "potential_shifts": []},
                "summary": "Direct contradiction with chapter one."
            }"#
            .to_string(),
        })),
    )
    .await;
    engine.index_corpus(&drafts).await.unwrap();

    let summary = engine
        .check_continuity_for_ui("The city abandoned camera networks entirely.")
        .await;

    assert_eq!(summary.status, ReportStatus::CriticalIssues);
    assert_eq!(summary.score, 40);
    assert_eq!(summary.score_label, "Critical Issues");
    assert_eq!(summary.issues.high.len(), 1);
    assert!(summary.issues.medium.is_empty());
}

#[tokio::test]
async fn test_malformed_response_keeps_raw() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(
        &tmp,
        Some(Box::new(ScriptedAnalyst {
            response: "The passage seems fine to me.".to_string(),
        })),
    )
    .await;
    engine.index_corpus(&drafts).await.unwrap();

    let report = engine.check_continuity("some new passage text").await;
    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.error.unwrap().kind, CheckErrorKind::MalformedAnalysis);
    assert_eq!(report.raw_response.as_deref(), Some("The passage seems fine to me."));
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(&tmp, None).await;

    engine.index_corpus(&drafts).await.unwrap();
    let first = engine.stats().await.unwrap().total_entries;
    engine.index_corpus(&drafts).await.unwrap();
    let second = engine.stats().await.unwrap().total_entries;

    assert_eq!(first, 3);
    assert_eq!(second, 3);
}

#[tokio::test]
async fn test_find_similar_threshold() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(&tmp, None).await;
    engine.index_corpus(&drafts).await.unwrap();

    // Exact text clears any threshold.
    let exact = engine
        .find_similar(
            "Smart city initiatives rely heavily on data analytics for governance decisions, \
             and the resulting dashboards became the primary interface between officials and streets.",
            5,
            Some(0.9),
        )
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].source_file, "ch2.md");

    // An impossible threshold filters everything out.
    let none = engine
        .find_similar("totally unrelated culinary musings", 5, Some(0.999))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_clear_then_check_reports_empty() {
    let tmp = TempDir::new().unwrap();
    let drafts = write_corpus(tmp.path());
    let engine = engine_with(
        &tmp,
        Some(Box::new(ScriptedAnalyst {
            response: CONSISTENT_RESPONSE.to_string(),
        })),
    )
    .await;
    engine.index_corpus(&drafts).await.unwrap();
    engine.clear().await.unwrap();

    assert_eq!(engine.stats().await.unwrap().total_entries, 0);
    let report = engine.check_continuity("anything").await;
    assert_eq!(report.error.unwrap().kind, CheckErrorKind::EmptyIndex);
}
