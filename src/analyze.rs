//! Structured legal analysis of a single document.
//!
//! Sends a bounded prefix of the document text to the language model with a
//! strict-JSON extraction prompt and parses the result into the fixed
//! analysis shape. Any failure — transport, refusal, malformed JSON —
//! degrades to the sentinel error object instead of propagating, so one bad
//! document never aborts a batch.
//!
//! The prefix truncation (default 15,000 characters) drops late clauses of
//! very long documents. Known information-loss tradeoff; there is no
//! map-reduce summarization fallback.

use serde_json::json;
use tracing::warn;

use crate::llm::LlmClient;
use crate::models::AnalysisReport;

/// Message stored in place of an analysis when the model call or parse fails.
pub const ANALYSIS_FAILED: &str = "Failed to analyze document";

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a legal document analyst for corporate counsel. \
You respond with a single strict JSON object and nothing else: no prose, no markdown.";

/// Analyze a document's full text, returning the parsed analysis object or
/// the sentinel error object `{"error": "Failed to analyze document"}`.
pub async fn analyze_document(
    llm: &dyn LlmClient,
    full_text: &str,
    max_chars: usize,
) -> serde_json::Value {
    let prefix = truncate_chars(full_text, max_chars);
    let prompt = build_prompt(prefix);

    let raw = match llm.complete(ANALYSIS_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("document analysis model call failed: {e:#}");
            return failure_sentinel();
        }
    };

    let cleaned = strip_code_fences(&raw);

    match serde_json::from_str::<AnalysisReport>(cleaned) {
        Ok(report) => {
            // Re-serialize so the persisted object carries exactly the
            // fixed key set, whatever extra keys the model emitted.
            serde_json::to_value(&report).unwrap_or_else(|_| failure_sentinel())
        }
        Err(e) => {
            warn!("document analysis returned unparseable JSON: {e}");
            failure_sentinel()
        }
    }
}

/// The sentinel persisted when analysis fails. Whole object, never partial.
pub fn failure_sentinel() -> serde_json::Value {
    json!({ "error": ANALYSIS_FAILED })
}

fn build_prompt(document_text: &str) -> String {
    format!(
        "Extract the following fields from the legal document below and return them \
as one JSON object with exactly these keys:\n\
  \"parties\": array of party names,\n\
  \"agreement_type\": string,\n\
  \"termination_clause\": string summary of termination terms,\n\
  \"payment_terms\": string summary,\n\
  \"liability_indemnity\": string summary,\n\
  \"risk_rating\": one of \"High\", \"Medium\", \"Low\",\n\
  \"key_risks\": array of short risk descriptions.\n\
Use null for fields the document does not address.\n\n\
Document:\n{document_text}"
    )
}

/// Take the first `max_chars` characters, respecting char boundaries.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

/// Remove a surrounding markdown code fence if the model wrapped its JSON in
/// one (```json ... ``` or plain ``` ... ```).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match inner.find('\n') {
        Some(newline) if inner[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            inner[newline + 1..].trim()
        }
        _ => inner.trim(),
    }
}
