//! Case strategy generation.
//!
//! Pure prompt assembly plus a single model call; no retrieval. The prompt
//! asks for a JSON-shaped plan, but the output is returned as-is and never
//! parsed here — callers must not assume valid JSON without checking.

use anyhow::Result;
use serde_json::Value;

use crate::llm::LlmClient;

const STRATEGY_SYSTEM_PROMPT: &str = "You are LexVault, an AI corporate counsel. \
You draft pragmatic legal strategy memos grounded in the case facts and document analyses provided.";

/// Generate a strategy memo from a case summary and the accumulated document
/// analyses. Model failure propagates to the caller (unlike chat, there is
/// no degraded text to stand in for a memo).
pub async fn generate_strategy(
    llm: &dyn LlmClient,
    case_summary: &str,
    analyses: &[Value],
) -> Result<String> {
    let analyses_text = if analyses.is_empty() {
        "No document analyses are available yet.".to_string()
    } else {
        analyses
            .iter()
            .enumerate()
            .map(|(i, a)| format!("Document {}: {}", i + 1, a))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt = format!(
        "Case summary: {case_summary}\n\n\
Document analyses:\n{analyses_text}\n\n\
Draft a strategic plan for this case as a JSON object with keys \
\"objectives\", \"recommended_actions\", \"risks\", and \"timeline\"."
    );

    llm.complete(STRATEGY_SYSTEM_PROMPT, &prompt).await
}
