//! End-to-end pipeline tests over a temporary SQLite database, with
//! deterministic in-process doubles for the embedding and language models.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use lexvault::cases;
use lexvault::chat;
use lexvault::config::{Config, DbConfig, ServerConfig};
use lexvault::embedding::EmbeddingProvider;
use lexvault::ingest::{IngestJob, Ingestor};
use lexvault::llm::LlmClient;
use lexvault::migrate;
use lexvault::models::Sender;
use lexvault::retriever::Retriever;
use lexvault::vector_store::{ChunkFilter, ChunkInsert, ChunkMeta, VectorStore};

const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: tokens hash into a fixed number of
/// buckets, so texts sharing words have positive cosine similarity and
/// repeated runs produce identical vectors.
struct HashEmbedder;

fn hash_token(token: &str) -> usize {
    let mut h: u64 = 1469598103934665603;
    for b in token.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    (h % DIMS as u64) as usize
}

fn embed_one(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        v[hash_token(token)] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bag-of-words"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_one(t)).collect())
    }
}

/// Embedder whose every call fails, standing in for an unavailable
/// embedding service.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding service unavailable")
    }
}

/// Embedder returning the same vector for every text: every similarity
/// score ties, exposing the tie-break order.
struct ConstantEmbedder;

#[async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0f32; 8]).collect())
    }
}

enum LlmBehavior {
    /// Return this text for analysis prompts and that text for chat prompts.
    Scripted { analysis: String, chat: String },
    Failing,
    /// Sleep before answering, to keep an ingestion run observably in flight.
    Slow(Duration),
    /// Panic instead of answering, standing in for a client bug.
    Panicking,
}

struct MockLlm(LlmBehavior);

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, system: &str, _user: &str) -> Result<String> {
        match &self.0 {
            LlmBehavior::Scripted { analysis, chat } => {
                if system.contains("legal document analyst") {
                    Ok(analysis.clone())
                } else {
                    Ok(chat.clone())
                }
            }
            LlmBehavior::Failing => anyhow::bail!("model endpoint returned 503"),
            LlmBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("{}".to_string())
            }
            LlmBehavior::Panicking => panic!("model client crashed"),
        }
    }
}

fn scripted_llm() -> Arc<MockLlm> {
    Arc::new(MockLlm(LlmBehavior::Scripted {
        analysis: r#"{"parties": ["Acme", "Bolt"], "agreement_type": "Service Agreement",
            "termination_clause": "Either party may terminate with 30 days notice.",
            "payment_terms": "Net 30", "liability_indemnity": "Capped at fees paid",
            "risk_rating": "Low", "key_risks": ["Short notice period"]}"#
            .to_string(),
        chat: "Termination requires 30 days written notice.".to_string(),
    }))
}

async fn test_pool(tmp: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        tmp.path().join("lexvault.sqlite").display()
    ))
    .unwrap()
    .create_if_missing(true)
    .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap();

    migrate::run_migrations(&pool).await.unwrap();
    pool
}

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("lexvault.sqlite"),
        },
        storage: Default::default(),
        chunking: Default::default(),
        retrieval: Default::default(),
        embedding: Default::default(),
        llm: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            ingest_timeout_secs: 30,
        },
    }
}

fn write_upload(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn ingest_text_document(
    pool: &SqlitePool,
    vectors: &Arc<VectorStore>,
    llm: Arc<dyn LlmClient>,
    tmp: &TempDir,
    case_id: &str,
    filename: &str,
    content: &str,
) -> Result<String> {
    let path = write_upload(tmp, filename, content);
    let doc = cases::create_document_placeholder(pool, case_id, filename, &path.to_string_lossy())
        .await
        .unwrap();

    let ingestor = Ingestor::new(&test_config(tmp), pool.clone(), vectors.clone(), llm);
    ingestor
        .run(&IngestJob {
            document_id: doc.id.clone(),
            case_id: case_id.to_string(),
            filename: filename.to_string(),
            stored_path: path,
        })
        .await?;

    Ok(doc.id)
}

#[tokio::test]
async fn upload_scenario_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));

    let case1 = cases::create_case(&pool, "Vendor dispute", "Contract", "IN", None)
        .await
        .unwrap();
    let case2 = cases::create_case(&pool, "Unrelated matter", "Employment", "IN", None)
        .await
        .unwrap();

    let doc_id = ingest_text_document(
        &pool,
        &vectors,
        scripted_llm(),
        &tmp,
        &case1.id,
        "doc1.txt",
        "Termination requires 30 days notice.",
    )
    .await
    .unwrap();

    // Record was updated in place: full text plus non-empty termination clause.
    let doc = cases::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert!(doc.is_processed());
    assert_eq!(doc.extracted_text, "Termination requires 30 days notice.");
    let analysis = doc.analysis().unwrap();
    assert!(!analysis["termination_clause"].as_str().unwrap().is_empty());

    // Case-scoped retrieval finds doc1's chunk for case1 and nothing for case2.
    let retriever = Retriever::new(vectors.clone());
    let hits = retriever
        .retrieve(&case1.id, "notice period", 4)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].meta.document_id, doc_id);

    let other = retriever
        .retrieve(&case2.id, "notice period", 4)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn search_filter_isolates_cases() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = VectorStore::new(pool.clone(), Arc::new(HashEmbedder));

    let mk = |case: &str, doc: &str, text: &str| ChunkInsert {
        text: text.to_string(),
        chunk_index: 0,
        meta: ChunkMeta {
            case_id: case.to_string(),
            document_id: doc.to_string(),
        },
    };

    vectors
        .upsert(&[
            mk("case-a", "doc-a1", "indemnity obligations survive termination"),
            mk("case-a", "doc-a2", "payment due within thirty days"),
            mk("case-b", "doc-b1", "indemnity and liability are capped"),
        ])
        .await
        .unwrap();

    let hits = vectors
        .search("indemnity", 10, &ChunkFilter::for_case("case-a"))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.meta.case_id == "case-a"));

    let hits_b = vectors
        .search("indemnity", 10, &ChunkFilter::for_case("case-b"))
        .await
        .unwrap();
    assert_eq!(hits_b.len(), 1);
    assert_eq!(hits_b[0].meta.document_id, "doc-b1");

    // Empty upsert is a no-op, not an error.
    assert_eq!(vectors.upsert(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn equal_scores_rank_by_insertion_order_deterministically() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = VectorStore::new(pool.clone(), Arc::new(ConstantEmbedder));

    let inserts: Vec<ChunkInsert> = (0..5)
        .map(|i| ChunkInsert {
            text: format!("chunk number {i}"),
            chunk_index: i,
            meta: ChunkMeta {
                case_id: "case-t".to_string(),
                document_id: "doc-t".to_string(),
            },
        })
        .collect();
    vectors.upsert(&inserts).await.unwrap();

    let first = vectors
        .search("anything", 5, &ChunkFilter::for_case("case-t"))
        .await
        .unwrap();
    let second = vectors
        .search("anything else", 5, &ChunkFilter::for_case("case-t"))
        .await
        .unwrap();

    let texts: Vec<&str> = first.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "chunk number 0",
            "chunk number 1",
            "chunk number 2",
            "chunk number 3",
            "chunk number 4"
        ]
    );
    let texts2: Vec<&str> = second.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, texts2);
}

#[tokio::test]
async fn deleting_case_purges_vectors_and_rows() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));

    let case = cases::create_case(&pool, "To be deleted", "Contract", "IN", None)
        .await
        .unwrap();
    ingest_text_document(
        &pool,
        &vectors,
        scripted_llm(),
        &tmp,
        &case.id,
        "doomed.txt",
        "This agreement shall be governed by the laws of India.",
    )
    .await
    .unwrap();
    cases::insert_message(&pool, &case.id, Sender::User, "hello")
        .await
        .unwrap();

    assert!(vectors.count(&ChunkFilter::for_case(&case.id)).await.unwrap() > 0);

    let purge = cases::purge_case(&pool, &vectors, &case.id)
        .await
        .unwrap()
        .expect("case existed");
    assert!(purge.vectors_deleted > 0);
    assert_eq!(purge.documents_deleted, 1);
    assert_eq!(purge.messages_deleted, 1);

    assert_eq!(vectors.count(&ChunkFilter::for_case(&case.id)).await.unwrap(), 0);
    assert!(cases::get_case(&pool, &case.id).await.unwrap().is_none());
    assert!(cases::list_documents(&pool, &case.id).await.unwrap().is_empty());
    assert!(cases::list_messages(&pool, &case.id).await.unwrap().is_empty());

    // Deleting again reports not-found instead of silently succeeding.
    assert!(cases::purge_case(&pool, &vectors, &case.id)
        .await
        .unwrap()
        .is_none());

    // A filtered delete matching nothing is a no-op.
    assert_eq!(
        vectors.delete(&ChunkFilter::for_case("no-such-case")).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn failed_analysis_persists_sentinel_not_partial() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));

    let case = cases::create_case(&pool, "Analysis fails", "Contract", "IN", None)
        .await
        .unwrap();
    let doc_id = ingest_text_document(
        &pool,
        &vectors,
        Arc::new(MockLlm(LlmBehavior::Failing)),
        &tmp,
        &case.id,
        "bad.txt",
        "Some contract text.",
    )
    .await
    .unwrap();

    let doc = cases::get_document(&pool, &doc_id).await.unwrap().unwrap();
    assert!(doc.is_processed());
    let analysis = doc.analysis().unwrap();
    assert_eq!(analysis["error"], "Failed to analyze document");
    assert!(analysis.get("termination_clause").is_none());

    // The sentinel is the whole stored object, never a partial report.
    assert_eq!(analysis.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_embedding_leaves_placeholder_untouched() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(FailingEmbedder)));

    let case = cases::create_case(&pool, "Embedding down", "Contract", "IN", None)
        .await
        .unwrap();
    let result = ingest_text_document(
        &pool,
        &vectors,
        scripted_llm(),
        &tmp,
        &case.id,
        "stuck.txt",
        "Text that will never be embedded.",
    )
    .await;
    assert!(result.is_err());

    let docs = cases::list_documents(&pool, &case.id).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].is_processed());
    assert!(docs[0].analysis().is_none());
}

#[tokio::test]
async fn chat_degrades_to_fixed_message_on_model_failure() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));
    let retriever = Retriever::new(vectors);

    let llm = MockLlm(LlmBehavior::Failing);
    let answer = chat::respond(&retriever, &llm, "case-x", "What are the payment terms?", 4).await;
    assert_eq!(answer, chat::DEGRADED_MESSAGE);
}

#[tokio::test]
async fn degraded_chat_turn_is_persisted_in_order() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));
    let retriever = Retriever::new(vectors);

    let case = cases::create_case(&pool, "Model outage", "Contract", "IN", None)
        .await
        .unwrap();

    let llm = MockLlm(LlmBehavior::Failing);
    let turn = chat::run_turn(&pool, &retriever, &llm, &case.id, "What are the payment terms?", 4)
        .await
        .unwrap();
    assert_eq!(turn.ai_message.content, chat::DEGRADED_MESSAGE);

    // Both turns landed in the transcript, user message first, even though
    // the model call failed.
    let messages = cases::list_messages(&pool, &case.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, "user");
    assert_eq!(messages[0].content, "What are the payment terms?");
    assert_eq!(messages[1].sender, "ai");
    assert_eq!(messages[1].content, chat::DEGRADED_MESSAGE);
}

#[tokio::test]
async fn chat_answers_from_empty_context_when_retrieval_fails() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(FailingEmbedder)));
    let retriever = Retriever::new(vectors);

    // Query embedding fails, so retrieval errors; the turn still reaches the
    // model with empty context instead of aborting.
    let llm = MockLlm(LlmBehavior::Scripted {
        analysis: "{}".to_string(),
        chat: "I can only offer general guidance here.".to_string(),
    });
    let answer = chat::respond(&retriever, &llm, "case-z", "Any indemnity cap?", 4).await;
    assert_eq!(answer, "I can only offer general guidance here.");
}

#[tokio::test]
async fn chat_with_no_chunks_still_prompts_and_can_refuse() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));
    let retriever = Retriever::new(vectors);

    // Model follows its refusal instruction when the context is empty.
    let llm = MockLlm(LlmBehavior::Scripted {
        analysis: "{}".to_string(),
        chat: chat::REFUSAL_TEXT.to_string(),
    });
    let answer = chat::respond(&retriever, &llm, "empty-case", "Who signed the lease?", 4).await;
    assert_eq!(answer, chat::REFUSAL_TEXT);
}

#[tokio::test]
async fn double_trigger_for_same_document_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));

    let case = cases::create_case(&pool, "Concurrent", "Contract", "IN", None)
        .await
        .unwrap();
    let path = write_upload(&tmp, "slow.txt", "Slow document body.");
    let doc = cases::create_document_placeholder(&pool, &case.id, "slow.txt", &path.to_string_lossy())
        .await
        .unwrap();

    let ingestor = Arc::new(Ingestor::new(
        &test_config(&tmp),
        pool.clone(),
        vectors,
        Arc::new(MockLlm(LlmBehavior::Slow(Duration::from_millis(300)))),
    ));

    let job = IngestJob {
        document_id: doc.id.clone(),
        case_id: case.id.clone(),
        filename: "slow.txt".to_string(),
        stored_path: path,
    };

    let first = ingestor.spawn(job.clone());
    assert!(first.is_some());
    // While the first run sleeps in the model call, a re-trigger is refused.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ingestor.spawn(job.clone()).is_none());

    first.unwrap().await.unwrap();

    // After completion the guard clears and an explicit re-trigger works.
    let retry = ingestor.spawn(job);
    assert!(retry.is_some());
    retry.unwrap().await.unwrap();
}

#[tokio::test]
async fn panicked_ingestion_releases_the_in_flight_guard() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let vectors = Arc::new(VectorStore::new(pool.clone(), Arc::new(HashEmbedder)));

    let case = cases::create_case(&pool, "Client bug", "Contract", "IN", None)
        .await
        .unwrap();
    let path = write_upload(&tmp, "crash.txt", "Contract body.");
    let doc =
        cases::create_document_placeholder(&pool, &case.id, "crash.txt", &path.to_string_lossy())
            .await
            .unwrap();

    let ingestor = Arc::new(Ingestor::new(
        &test_config(&tmp),
        pool.clone(),
        vectors,
        Arc::new(MockLlm(LlmBehavior::Panicking)),
    ));

    let job = IngestJob {
        document_id: doc.id.clone(),
        case_id: case.id.clone(),
        filename: "crash.txt".to_string(),
        stored_path: path,
    };

    let handle = ingestor.spawn(job.clone()).expect("first trigger accepted");
    assert!(handle.await.is_err());

    // The crashed run must not leave the document locked: a re-trigger is
    // accepted again.
    let retry = ingestor.spawn(job);
    assert!(retry.is_some());
    let _ = retry.unwrap().await;
}
