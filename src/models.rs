//! Core data models used throughout LexVault.
//!
//! These types represent the cases, messages, and documents that flow through
//! the ingestion and retrieval pipeline. The chunk vector rows live behind
//! the vector store adapter and never appear here as first-class records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A legal case: the unit of scoping for retrieval and deletion.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Case {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub jurisdiction: String,
    pub amount: Option<i64>,
    pub created_at: i64,
}

/// Who authored a case message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

/// One turn of a case conversation. Append-only, ordered by creation time.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CaseMessage {
    pub id: String,
    pub case_id: String,
    pub sender: String,
    pub content: String,
    pub created_at: i64,
}

/// Placeholder text stored until ingestion completes.
pub const PROCESSING_SENTINEL: &str = "Processing...";

/// A document attached to a case.
///
/// Created as a placeholder at upload time (`extracted_text` holds
/// [`PROCESSING_SENTINEL`], `analysis_json` an empty object) and mutated in
/// place exactly once when ingestion succeeds. A failed ingestion leaves the
/// placeholder untouched.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Document {
    pub id: String,
    pub case_id: String,
    pub filename: String,
    pub stored_path: String,
    pub extracted_text: String,
    pub analysis_json: String,
    pub created_at: i64,
}

impl Document {
    pub fn is_processed(&self) -> bool {
        self.extracted_text != PROCESSING_SENTINEL
    }

    /// Parsed analysis object, or `None` while the document is unprocessed
    /// or the stored JSON is empty. Consumers must tolerate `None`.
    pub fn analysis(&self) -> Option<serde_json::Value> {
        let value: serde_json::Value = serde_json::from_str(&self.analysis_json).ok()?;
        match &value {
            serde_json::Value::Object(map) if map.is_empty() => None,
            serde_json::Value::Null => None,
            _ => Some(value),
        }
    }
}

/// Risk classification produced by document analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskRating {
    High,
    Medium,
    Low,
}

/// Fixed-shape structured analysis of one document.
///
/// Produced whole by the analyzer and overwritten whole on re-analysis,
/// never partially merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub parties: Vec<String>,
    #[serde(default)]
    pub agreement_type: Option<String>,
    #[serde(default)]
    pub termination_clause: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub liability_indemnity: Option<String>,
    #[serde(default)]
    pub risk_rating: Option<RiskRating>,
    #[serde(default)]
    pub key_risks: Vec<String>,
}
