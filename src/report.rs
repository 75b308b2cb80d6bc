//! Report formatting for UI consumption.
//!
//! Pure transformations from a [`ConsistencyReport`] to a compact summary:
//! a qualitative score label, issues grouped by severity, and the
//! low-consistency warning passed through unchanged. No side effects.

use serde::Serialize;

use crate::models::{
    CheckError, ConsistencyReport, Issue, LowConsistencyWarning, ReportStatus, Severity,
};

/// UI-oriented view of a consistency report.
#[derive(Debug, Clone, Serialize)]
pub struct UiSummary {
    pub status: ReportStatus,
    pub score: u8,
    pub score_label: String,
    pub summary: String,
    pub related_section_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_similarity_percent: Option<f64>,
    pub issues: IssueBuckets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_consistency_warning: Option<LowConsistencyWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
}

/// Issues grouped by severity, original order preserved within a bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueBuckets {
    pub high: Vec<Issue>,
    pub medium: Vec<Issue>,
    pub low: Vec<Issue>,
}

/// Map a numeric score to its qualitative label.
pub fn score_label(score: u8) -> &'static str {
    if score >= 95 {
        "Excellent"
    } else if score >= 85 {
        "Good"
    } else if score >= 70 {
        "Fair"
    } else if score >= 50 {
        "Needs Review"
    } else {
        "Critical Issues"
    }
}

/// Reduce a full report into its UI summary.
pub fn format_for_ui(report: &ConsistencyReport) -> UiSummary {
    let mut buckets = IssueBuckets::default();
    for issue in &report.issues {
        match issue.severity {
            Severity::High => buckets.high.push(issue.clone()),
            Severity::Medium => buckets.medium.push(issue.clone()),
            Severity::Low => buckets.low.push(issue.clone()),
        }
    }

    UiSummary {
        status: report.status,
        score: report.overall_score,
        score_label: score_label(report.overall_score).to_string(),
        summary: report.summary.clone(),
        related_section_count: report.related_sections.len(),
        avg_similarity_percent: report.avg_similarity_percent,
        issues: buckets,
        low_consistency_warning: report.low_consistency_warning.clone(),
        error: report.error.clone(),
    }
}
