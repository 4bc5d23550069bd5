//! Relational store for cases, messages, and documents.
//!
//! Thin sqlx query layer. The one non-trivial operation is [`purge_case`]:
//! the vector store and the relational store have no cross-system
//! transaction, so case deletion is a best-effort two-phase cleanup —
//! vectors first, then rows. A crash between the phases leaves an orphaned
//! relational row that a re-run can still find and delete; the reverse order
//! would leave unowned vectors with no surviving reference to them.

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Case, CaseMessage, Document, Sender, PROCESSING_SENTINEL};
use crate::vector_store::{ChunkFilter, VectorStore};

pub async fn create_case(
    pool: &SqlitePool,
    title: &str,
    category: &str,
    jurisdiction: &str,
    amount: Option<i64>,
) -> Result<Case> {
    let case = Case {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        category: category.to_string(),
        status: "intake".to_string(),
        jurisdiction: jurisdiction.to_string(),
        amount,
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO cases (id, title, category, status, jurisdiction, amount, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&case.id)
    .bind(&case.title)
    .bind(&case.category)
    .bind(&case.status)
    .bind(&case.jurisdiction)
    .bind(case.amount)
    .bind(case.created_at)
    .execute(pool)
    .await?;

    Ok(case)
}

pub async fn list_cases(pool: &SqlitePool) -> Result<Vec<Case>> {
    let cases = sqlx::query_as::<_, Case>("SELECT * FROM cases ORDER BY created_at DESC, id")
        .fetch_all(pool)
        .await?;
    Ok(cases)
}

pub async fn get_case(pool: &SqlitePool, case_id: &str) -> Result<Option<Case>> {
    let case = sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = ?")
        .bind(case_id)
        .fetch_optional(pool)
        .await?;
    Ok(case)
}

/// One-line case summary used as strategy-prompt input.
pub fn case_summary(case: &Case) -> String {
    format!(
        "Title: {}. Category: {}. Status: {}. Jurisdiction: {}.",
        case.title, case.category, case.status, case.jurisdiction
    )
}

pub async fn list_messages(pool: &SqlitePool, case_id: &str) -> Result<Vec<CaseMessage>> {
    let messages = sqlx::query_as::<_, CaseMessage>(
        "SELECT * FROM case_messages WHERE case_id = ? ORDER BY created_at, rowid",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

pub async fn insert_message(
    pool: &SqlitePool,
    case_id: &str,
    sender: Sender,
    content: &str,
) -> Result<CaseMessage> {
    let message = CaseMessage {
        id: Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        sender: sender.as_str().to_string(),
        content: content.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO case_messages (id, case_id, sender, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&message.id)
    .bind(&message.case_id)
    .bind(&message.sender)
    .bind(&message.content)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    Ok(message)
}

pub async fn list_documents(pool: &SqlitePool, case_id: &str) -> Result<Vec<Document>> {
    let documents = sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE case_id = ? ORDER BY created_at, rowid",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;
    Ok(documents)
}

pub async fn get_document(pool: &SqlitePool, document_id: &str) -> Result<Option<Document>> {
    let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(pool)
        .await?;
    Ok(document)
}

/// Insert the placeholder record returned to the client immediately at
/// upload time. Ingestion later replaces the sentinel text and empty
/// analysis in one update, or leaves them untouched on failure.
pub async fn create_document_placeholder(
    pool: &SqlitePool,
    case_id: &str,
    filename: &str,
    stored_path: &str,
) -> Result<Document> {
    let document = Document {
        id: Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        filename: filename.to_string(),
        stored_path: stored_path.to_string(),
        extracted_text: PROCESSING_SENTINEL.to_string(),
        analysis_json: "{}".to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO documents (id, case_id, filename, stored_path, extracted_text, analysis_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document.id)
    .bind(&document.case_id)
    .bind(&document.filename)
    .bind(&document.stored_path)
    .bind(&document.extracted_text)
    .bind(&document.analysis_json)
    .bind(document.created_at)
    .execute(pool)
    .await?;

    Ok(document)
}

/// Write the extracted text and analysis in one update once ingestion
/// succeeds.
pub async fn mark_document_processed(
    pool: &SqlitePool,
    document_id: &str,
    extracted_text: &str,
    analysis_json: &str,
) -> Result<()> {
    sqlx::query("UPDATE documents SET extracted_text = ?, analysis_json = ? WHERE id = ?")
        .bind(extracted_text)
        .bind(analysis_json)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Non-empty analyses for a case's documents, for strategy generation.
/// Documents still processing (or failed) simply contribute nothing.
pub async fn list_analyses(pool: &SqlitePool, case_id: &str) -> Result<Vec<serde_json::Value>> {
    let documents = list_documents(pool, case_id).await?;
    Ok(documents.iter().filter_map(|d| d.analysis()).collect())
}

/// Outcome of a cascading case deletion.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CasePurge {
    pub vectors_deleted: u64,
    pub documents_deleted: u64,
    pub messages_deleted: u64,
}

/// Delete a case and everything it owns: vector chunks, documents, messages.
///
/// Returns `Ok(None)` when the case does not exist (callers report
/// not-found rather than silently succeeding). Phase 1 purges the vector
/// store; phase 2 removes the relational rows in one transaction.
pub async fn purge_case(
    pool: &SqlitePool,
    vectors: &VectorStore,
    case_id: &str,
) -> Result<Option<CasePurge>> {
    if get_case(pool, case_id).await?.is_none() {
        return Ok(None);
    }

    let vectors_deleted = vectors.delete(&ChunkFilter::for_case(case_id)).await?;

    let mut tx = pool.begin().await?;
    let messages_deleted = sqlx::query("DELETE FROM case_messages WHERE case_id = ?")
        .bind(case_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let documents_deleted = sqlx::query("DELETE FROM documents WHERE case_id = ?")
        .bind(case_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM cases WHERE id = ?")
        .bind(case_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Some(CasePurge {
        vectors_deleted,
        documents_deleted,
        messages_deleted,
    }))
}
