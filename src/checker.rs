//! Continuity check pipeline.
//!
//! Each check is state-free and runs the same steps:
//!
//! 1. precondition checks (indexed corpus present, analyst configured) —
//!    failures are distinguishable `error`-status reports, not panics;
//! 2. nearest-neighbor retrieval (top `retrieval.top_k`), with every
//!    backend distance converted through the same
//!    `similarity = 1 / (1 + distance)` transform;
//! 3. context selection (top `retrieval.context_k` by similarity);
//! 4. delegated analysis under the strict JSON contract in
//!    [`crate::analyst::SYSTEM_PROMPT`]; an unparseable response becomes an
//!    `error` report that preserves the raw text for diagnostics;
//! 5. status derivation from the issue list;
//! 6. a deterministic low-consistency warning when the mean similarity
//!    across all retrieved sections falls below the configured floor —
//!    attached regardless of what the analyst concluded.
//!
//! Nothing here raises past the public entry point: every failure mode is
//! folded into the returned [`ConsistencyReport`].

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::analyst::{build_analysis_prompt, Analyst, SYSTEM_PROMPT};
use crate::config::RetrievalConfig;
use crate::models::{
    CheckError, CheckErrorKind, ConsistencyReport, Issue, LowConsistencyWarning, QueryHit,
    RelatedSection, ReportStatus, Severity, TerminologyAnalysis,
};
use crate::store::EmbeddingStore;

/// Backend-agnostic similarity transform: strictly decreasing in distance,
/// in (0, 1] for distance ≥ 0.
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Run one continuity check of `new_text` against the indexed corpus.
pub async fn check_continuity(
    store: &dyn EmbeddingStore,
    analyst: Option<&dyn Analyst>,
    config: &RetrievalConfig,
    new_text: &str,
) -> ConsistencyReport {
    let count = match store.count().await {
        Ok(count) => count,
        Err(e) => {
            return error_report(
                CheckErrorKind::StoreFailure,
                format!("failed to read the corpus index: {e:#}"),
                Vec::new(),
            )
        }
    };

    if count == 0 {
        return error_report(
            CheckErrorKind::EmptyIndex,
            "the corpus index is empty; index existing documents before checking continuity"
                .to_string(),
            Vec::new(),
        );
    }

    let Some(analyst) = analyst else {
        return error_report(
            CheckErrorKind::AnalystUnavailable,
            "no language-model analyst is configured; set [analyst] provider and its API key"
                .to_string(),
            Vec::new(),
        );
    };

    let hits = match store.query(new_text, config.top_k).await {
        Ok(hits) => hits,
        Err(e) => {
            return error_report(
                CheckErrorKind::StoreFailure,
                format!("similarity query failed: {e:#}"),
                Vec::new(),
            )
        }
    };

    let related = to_related_sections(&hits);
    let warning = low_consistency_warning(&related, config.low_similarity_threshold);
    let avg_percent = average_similarity_percent(&related);

    let context: Vec<RelatedSection> = related.iter().take(config.context_k).cloned().collect();
    let prompt = build_analysis_prompt(new_text, &context);

    let raw = match analyst.analyze(SYSTEM_PROMPT, &prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            let mut report = error_report(
                CheckErrorKind::AnalystFailure,
                format!("analyst request failed: {e:#}"),
                related,
            );
            report.avg_similarity_percent = avg_percent;
            report.low_consistency_warning = warning;
            return report;
        }
    };

    let payload = match parse_analysis(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            let mut report = error_report(
                CheckErrorKind::MalformedAnalysis,
                format!("analyst response was not the required structure: {e}"),
                related,
            );
            report.raw_response = Some(raw);
            report.avg_similarity_percent = avg_percent;
            report.low_consistency_warning = warning;
            return report;
        }
    };

    let status = derive_status(&payload.issues);

    ConsistencyReport {
        report_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        status,
        overall_score: payload.overall_score.clamp(0, 100) as u8,
        related_sections: related,
        issues: payload.issues,
        terminology: payload.terminology_analysis,
        summary: payload.summary,
        avg_similarity_percent: avg_percent,
        low_consistency_warning: warning,
        error: None,
        raw_response: None,
    }
}

pub(crate) fn to_related_sections(hits: &[QueryHit]) -> Vec<RelatedSection> {
    hits.iter()
        .map(|hit| {
            let distance = hit.distance.max(0.0) as f64;
            RelatedSection {
                text: hit.text.clone(),
                source_file: hit.metadata.source_file.clone(),
                paragraph_index: hit.metadata.paragraph_index,
                similarity: similarity_from_distance(distance),
                distance,
            }
        })
        .collect()
}

fn average_similarity_percent(related: &[RelatedSection]) -> Option<f64> {
    if related.is_empty() {
        return None;
    }
    let mean = related.iter().map(|s| s.similarity).sum::<f64>() / related.len() as f64;
    Some((mean * 1000.0).round() / 10.0)
}

/// The warning fires iff at least one related section exists and the mean
/// similarity across all of them is below `threshold`.
fn low_consistency_warning(
    related: &[RelatedSection],
    threshold: f64,
) -> Option<LowConsistencyWarning> {
    if related.is_empty() {
        return None;
    }
    let mean = related.iter().map(|s| s.similarity).sum::<f64>() / related.len() as f64;
    if mean >= threshold {
        return None;
    }

    Some(LowConsistencyWarning {
        triggered: true,
        avg_similarity_percent: (mean * 1000.0).round() / 10.0,
        message: "The new text shows low similarity to the indexed corpus and may be \
                  drifting from the established argument."
            .to_string(),
    })
}

fn derive_status(issues: &[Issue]) -> ReportStatus {
    if issues.is_empty() {
        ReportStatus::Consistent
    } else if issues.iter().any(|i| i.severity == Severity::High) {
        ReportStatus::CriticalIssues
    } else {
        ReportStatus::IssuesFound
    }
}

fn error_report(
    kind: CheckErrorKind,
    message: String,
    related: Vec<RelatedSection>,
) -> ConsistencyReport {
    ConsistencyReport {
        report_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        status: ReportStatus::Error,
        overall_score: 0,
        related_sections: related,
        issues: Vec::new(),
        terminology: TerminologyAnalysis::default(),
        summary: String::new(),
        avg_similarity_percent: None,
        low_consistency_warning: None,
        error: Some(CheckError { kind, message }),
        raw_response: None,
    }
}

// ============ Analyst payload parsing ============

/// The structure the analyst is contractually required to return.
/// Individual fields default when absent (a missing issues array means no
/// issues), but the response must be a JSON object and every present field
/// must have the right shape.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    overall_score: i64,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    terminology_analysis: TerminologyAnalysis,
    #[serde(default)]
    summary: String,
}

fn parse_analysis(raw: &str) -> Result<AnalysisPayload, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

/// Analysts occasionally wrap JSON in markdown fences despite the
/// contract; tolerate that one deviation.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::embed::HashedEmbedder;
    use crate::models::{ParagraphEntry, ParagraphMetadata};
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Analyst returning a canned response, or failing outright.
    struct ScriptedAnalyst {
        response: Option<String>,
    }

    impl ScriptedAnalyst {
        fn returning(response: &str) -> Self {
            Self {
                response: Some(response.to_string()),
            }
        }

        fn failing() -> Self {
            Self { response: None }
        }
    }

    #[async_trait]
    impl Analyst for ScriptedAnalyst {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, _system: &str, _prompt: &str) -> Result<String> {
            match &self.response {
                Some(r) => Ok(r.clone()),
                None => anyhow::bail!("scripted failure"),
            }
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new(Arc::new(HashedEmbedder::new(64)));
        let paragraphs = [
            ("ch1_para_0", "The city deployed ten thousand networked cameras across its districts in 2019."),
            ("ch1_para_1", "Municipal data retention for camera footage was capped at thirty days by ordinance."),
            ("ch2_para_0", "Smart city initiatives rely heavily on data analytics for governance decisions."),
        ];
        let entries: Vec<ParagraphEntry> = paragraphs
            .iter()
            .map(|(id, text)| ParagraphEntry {
                id: id.to_string(),
                text: text.to_string(),
                metadata: ParagraphMetadata {
                    source_file: format!("{}.md", id.split("_para_").next().unwrap()),
                    chapter: id.split("_para_").next().unwrap().to_string(),
                    paragraph_index: 0,
                    word_count: crate::extract::word_count(text),
                    char_count: text.len(),
                    indexed_at: "2026-01-01T00:00:00Z".to_string(),
                },
            })
            .collect();
        store.upsert(&entries).await.unwrap();
        store
    }

    const CLEAN_RESPONSE: &str = r#"{
        "overall_score": 92,
        "issues": [],
        "terminology_analysis": {"new_terms": ["data governance"], "potential_shifts": []},
        "summary": "The passage is consistent with established material."
    }"#;

    #[test]
    fn test_similarity_transform_properties() {
        assert!((similarity_from_distance(0.0) - 1.0).abs() < 1e-12);
        assert!((similarity_from_distance(1.0) - 0.5).abs() < 1e-12);
        // Strictly decreasing, bounded in (0, 1].
        let mut previous = f64::INFINITY;
        for i in 0..100 {
            let s = similarity_from_distance(i as f64 * 0.1);
            assert!(s > 0.0 && s <= 1.0);
            assert!(s < previous);
            previous = s;
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_distinguishable_error() {
        let store = MemoryStore::new(Arc::new(HashedEmbedder::new(64)));
        let analyst = ScriptedAnalyst::returning(CLEAN_RESPONSE);

        let report = check_continuity(&store, Some(&analyst), &config(), "new text").await;
        assert_eq!(report.status, ReportStatus::Error);
        let error = report.error.unwrap();
        assert_eq!(error.kind, CheckErrorKind::EmptyIndex);
        assert!(error.message.contains("index"));
        assert!(report.related_sections.is_empty());
    }

    #[tokio::test]
    async fn test_missing_analyst_is_distinguishable_error() {
        let store = seeded_store().await;
        let report = check_continuity(&store, None, &config(), "new text").await;
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.error.unwrap().kind, CheckErrorKind::AnalystUnavailable);
    }

    #[tokio::test]
    async fn test_consistent_report() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::returning(CLEAN_RESPONSE);

        let report = check_continuity(
            &store,
            Some(&analyst),
            &config(),
            "The city deployed ten thousand networked cameras across its districts in 2019.",
        )
        .await;

        assert_eq!(report.status, ReportStatus::Consistent);
        assert_eq!(report.overall_score, 92);
        assert!(report.error.is_none());
        assert!(!report.related_sections.is_empty());
        assert_eq!(report.terminology.new_terms, vec!["data governance"]);
        // Identical text is indexed, so the top hit is a near-exact match.
        let top = &report.related_sections[0];
        assert!(top.similarity > 0.99);
        assert!(top.distance < 0.01);
    }

    #[tokio::test]
    async fn test_high_severity_issue_means_critical() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::returning(
            r#"{
                "overall_score": 40,
                "issues": [{
                    "type": "contradiction",
                    "severity": "high",
                    "new_claim": "The city never used cameras.",
                    "existing_claim": "The city deployed ten thousand cameras.",
                    "source_file": "ch1.md",
                    "recommendation": "Reconcile the deployment timeline."
                }],
                "terminology_analysis": {"new_terms": [], "potential_shifts": []},
                "summary": "Direct contradiction found."
            }"#,
        );

        let report =
            check_continuity(&store, Some(&analyst), &config(), "The city never used cameras.")
                .await;

        assert_eq!(report.status, ReportStatus::CriticalIssues);
        assert_eq!(report.overall_score, 40);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_medium_issues_mean_issues_found() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::returning(
            r#"{
                "overall_score": 75,
                "issues": [{
                    "type": "terminology_shift",
                    "severity": "medium",
                    "new_claim": "",
                    "existing_claim": "",
                    "recommendation": "Prefer one term."
                }],
                "summary": "Minor drift."
            }"#,
        );

        let report = check_continuity(&store, Some(&analyst), &config(), "some new text").await;
        assert_eq!(report.status, ReportStatus::IssuesFound);
    }

    #[tokio::test]
    async fn test_non_json_response_preserves_raw() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::returning("I think the passage looks fine overall!");

        let report = check_continuity(&store, Some(&analyst), &config(), "some new text").await;
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.error.as_ref().unwrap().kind, CheckErrorKind::MalformedAnalysis);
        assert_eq!(
            report.raw_response.as_deref(),
            Some("I think the passage looks fine overall!")
        );
        // Retrieval already happened; the sections survive for diagnostics.
        assert!(!report.related_sections.is_empty());
    }

    #[tokio::test]
    async fn test_fenced_json_is_tolerated() {
        let store = seeded_store().await;
        let fenced = format!("```json\n{}\n```", CLEAN_RESPONSE);
        let analyst = ScriptedAnalyst::returning(&fenced);

        let report = check_continuity(&store, Some(&analyst), &config(), "some new text").await;
        assert_eq!(report.status, ReportStatus::Consistent);
    }

    #[tokio::test]
    async fn test_analyst_failure_is_error_report() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::failing();

        let report = check_continuity(&store, Some(&analyst), &config(), "some new text").await;
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.error.unwrap().kind, CheckErrorKind::AnalystFailure);
    }

    #[tokio::test]
    async fn test_score_clamped_to_range() {
        let store = seeded_store().await;
        let analyst = ScriptedAnalyst::returning(r#"{"overall_score": 250, "summary": "high"}"#);

        let report = check_continuity(&store, Some(&analyst), &config(), "some new text").await;
        assert_eq!(report.overall_score, 100);
    }

    #[test]
    fn test_warning_fires_below_threshold() {
        let related: Vec<RelatedSection> = [0.40, 0.44]
            .iter()
            .map(|s| RelatedSection {
                text: String::new(),
                source_file: "ch1.md".to_string(),
                paragraph_index: 0,
                similarity: *s,
                distance: 1.0 / s - 1.0,
            })
            .collect();

        let warning = low_consistency_warning(&related, 0.5).unwrap();
        assert!(warning.triggered);
        assert_eq!(warning.avg_similarity_percent, 42.0);
    }

    #[test]
    fn test_warning_absent_at_or_above_threshold() {
        let related = vec![RelatedSection {
            text: String::new(),
            source_file: "ch1.md".to_string(),
            paragraph_index: 0,
            similarity: 0.5,
            distance: 1.0,
        }];
        assert!(low_consistency_warning(&related, 0.5).is_none());
        assert!(low_consistency_warning(&[], 0.5).is_none());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse_analysis("not json").is_err());
        assert!(parse_analysis("[1, 2, 3]").is_err());
        assert!(parse_analysis(r#"{"issues": "lots"}"#).is_err());
        assert!(parse_analysis(r#"{"issues": [{"type": "prophecy", "severity": "high"}]}"#).is_err());
    }
}
