//! Grounded chat responder.
//!
//! Retrieves the top-k chunks for the asking case, assembles a prompt that
//! embeds them as context alongside the literal question, and invokes the
//! language model. The prompt instructs the model to refuse rather than
//! fabricate when the context does not contain the answer.
//!
//! Degradation rules:
//! - Retrieval failure → answer from empty context, logged, not aborted.
//! - Zero retrieved chunks → the prompt is still sent with empty context;
//!   the refusal instruction handles insufficiency.
//! - Model failure → the fixed degraded-service message, persisted as the
//!   AI turn so the transcript stays gapless.
//!
//! [`run_turn`] is the durable unit: the user message is written before the
//! model is invoked and the reply (degraded text included) is written before
//! returning, so a crash mid-turn never loses the user's input.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::warn;

use crate::cases;
use crate::llm::LlmClient;
use crate::models::{CaseMessage, Sender};
use crate::retriever::Retriever;

/// Refusal the model is instructed to emit when the context is insufficient.
pub const REFUSAL_TEXT: &str = "I couldn't find that information in the documents.";

/// Fixed reply surfaced (and persisted) when the model call itself fails.
pub const DEGRADED_MESSAGE: &str = "I encountered an error processing your request.";

const CHAT_SYSTEM_PROMPT: &str = "You are LexVault, an AI corporate counsel. \
Answer using only the provided context from this case's documents. \
If the answer is not in the context, say \"I couldn't find that information in the documents.\" \
Do not make up legal advice.";

/// Answer `user_query` grounded in the documents of `case_id`.
///
/// Always returns text; failures surface as [`DEGRADED_MESSAGE`].
pub async fn respond(
    retriever: &Retriever,
    llm: &dyn LlmClient,
    case_id: &str,
    user_query: &str,
    top_k: usize,
) -> String {
    let chunks = match retriever.retrieve(case_id, user_query, top_k).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(case_id, "chat retrieval failed, answering with empty context: {e:#}");
            Vec::new()
        }
    };

    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let prompt = format!("Context:\n{context}\n\nQuestion: {user_query}\n\nAnswer:");

    match llm.complete(CHAT_SYSTEM_PROMPT, &prompt).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!(case_id, "chat model call failed: {e:#}");
            DEGRADED_MESSAGE.to_string()
        }
    }
}

/// Both persisted messages of one completed chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user_message: CaseMessage,
    pub ai_message: CaseMessage,
}

/// One durable chat turn: persist the user message, answer via [`respond`],
/// persist the AI reply. Only a storage failure errors; model and retrieval
/// failures are already absorbed into the answer text.
pub async fn run_turn(
    pool: &SqlitePool,
    retriever: &Retriever,
    llm: &dyn LlmClient,
    case_id: &str,
    content: &str,
    top_k: usize,
) -> Result<ChatTurn> {
    let user_message = cases::insert_message(pool, case_id, Sender::User, content).await?;

    let answer = respond(retriever, llm, case_id, content, top_k).await;

    let ai_message = cases::insert_message(pool, case_id, Sender::Ai, &answer).await?;

    Ok(ChatTurn {
        user_message,
        ai_message,
    })
}
