//! Core data models used throughout driftcheck.
//!
//! These types represent the paragraphs, store entries, and reports that
//! flow through the indexing and continuity-check pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A paragraph prepared for the embedding store.
#[derive(Debug, Clone)]
pub struct ParagraphEntry {
    /// Deterministic id: `"{document_stem}_para_{ordinal}"`.
    pub id: String,
    /// Full paragraph text.
    pub text: String,
    pub metadata: ParagraphMetadata,
}

/// Per-paragraph metadata stored alongside the embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParagraphMetadata {
    pub source_file: String,
    /// Document stem, used as the chapter/group name.
    pub chapter: String,
    /// Ordinal position of the paragraph within its document.
    pub paragraph_index: usize,
    pub word_count: usize,
    pub char_count: usize,
    /// RFC 3339 timestamp of the indexing pass that wrote this entry.
    pub indexed_at: String,
}

/// A ranked nearest-neighbor result from the embedding store.
///
/// `distance` is the backend's cosine distance — lower is closer —
/// regardless of which backend produced it.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: ParagraphMetadata,
    pub distance: f32,
}

/// Backend descriptor returned by [`stats`](crate::store::EmbeddingStore::stats).
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub total_entries: usize,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
}

/// An indexed paragraph related to the passage under check.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedSection {
    pub text: String,
    pub source_file: String,
    pub paragraph_index: usize,
    /// Normalized similarity in (0, 1], computed as `1 / (1 + distance)`.
    pub similarity: f64,
    pub distance: f64,
}

/// Overall outcome of a continuity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Consistent,
    IssuesFound,
    CriticalIssues,
    Error,
}

/// Kind of semantic conflict flagged by the analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Contradiction,
    TerminologyShift,
    Inconsistency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// A single conflict between the new passage and indexed material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    /// The claim made by the new passage.
    #[serde(default)]
    pub new_claim: String,
    /// The conflicting claim in previously indexed material.
    #[serde(default)]
    pub existing_claim: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub recommendation: String,
}

/// Terminology findings from the analyst.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminologyAnalysis {
    #[serde(default)]
    pub new_terms: Vec<String>,
    #[serde(default)]
    pub potential_shifts: Vec<TermShift>,
}

/// A term whose usage appears to have drifted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermShift {
    pub term: String,
    #[serde(default)]
    pub established_usage: String,
    #[serde(default)]
    pub new_usage: String,
}

/// Deterministic drift safety net, attached when the mean similarity
/// across all related sections falls below the configured floor.
#[derive(Debug, Clone, Serialize)]
pub struct LowConsistencyWarning {
    pub triggered: bool,
    pub avg_similarity_percent: f64,
    pub message: String,
}

/// Machine-readable reason for an `error`-status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckErrorKind {
    /// The store holds no entries; indexing must run first.
    EmptyIndex,
    /// No language-model analyst is configured.
    AnalystUnavailable,
    /// A store operation failed (network, quota, I/O).
    StoreFailure,
    /// The analyst request itself failed.
    AnalystFailure,
    /// The analyst responded, but not with the required structure.
    MalformedAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckError {
    pub kind: CheckErrorKind,
    pub message: String,
}

/// Full result of a continuity check. Ephemeral — never persisted here.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub report_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    /// 0–100; 0 on error reports.
    pub overall_score: u8,
    pub related_sections: Vec<RelatedSection>,
    pub issues: Vec<Issue>,
    pub terminology: TerminologyAnalysis,
    pub summary: String,
    /// Mean similarity across all related sections, as a percentage
    /// rounded to one decimal. Absent when nothing was retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_similarity_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_consistency_warning: Option<LowConsistencyWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
    /// Verbatim analyst response, preserved when it could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Aggregate result of a corpus indexing pass.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    /// True when the corpus directory was missing or empty; the directory
    /// is created so a later pass can find content.
    pub waiting_for_content: bool,
    pub backend: String,
    pub total_files: usize,
    pub total_paragraphs: usize,
    pub total_words: usize,
    pub files: Vec<FileReport>,
}

/// Per-file indexing outcome. A populated `error` never aborts the pass.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub chapter: String,
    pub paragraphs: usize,
    pub words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
