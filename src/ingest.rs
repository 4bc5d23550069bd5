//! Background document ingestion pipeline.
//!
//! One run per uploaded document: extract text → chunk + embed + store →
//! analyze → write the document record. Runs as a fire-and-forget tokio
//! task with its own timeout, detached from the upload request's lifetime.
//!
//! State machine: uploaded → extracting → chunking+embedding → analyzing →
//! complete, with `failed` terminal from any step. A failed run leaves the
//! document's placeholder text and empty analysis untouched and does not
//! retry; re-ingestion is an explicit re-trigger by the caller. The analyze
//! step is the one exception to fail-fast: a model or parse failure there
//! degrades to the sentinel analysis object and the run still completes.
//!
//! Concurrency: documents of one case may ingest concurrently; a second
//! trigger for a document already in flight is rejected by the in-flight
//! guard so each record is only ever updated by one run at a time.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::analyze::analyze_document;
use crate::cases;
use crate::chunk::chunk_windows;
use crate::config::Config;
use crate::extract;
use crate::llm::LlmClient;
use crate::vector_store::{ChunkInsert, ChunkMeta, VectorStore};

/// Everything a single ingestion run needs to know about its document.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub document_id: String,
    pub case_id: String,
    pub filename: String,
    pub stored_path: PathBuf,
}

/// Pipeline steps, for logging and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Extracting,
    ChunkingEmbedding,
    Analyzing,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestStage::Extracting => write!(f, "extracting"),
            IngestStage::ChunkingEmbedding => write!(f, "chunking+embedding"),
            IngestStage::Analyzing => write!(f, "analyzing"),
        }
    }
}

struct InFlightGuard {
    ingestor: Arc<Ingestor>,
    document_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.ingestor.in_flight.lock() {
            in_flight.remove(&self.document_id);
        }
    }
}

pub struct Ingestor {
    pool: SqlitePool,
    vectors: Arc<VectorStore>,
    llm: Arc<dyn LlmClient>,
    window_chars: usize,
    overlap_chars: usize,
    max_analysis_chars: usize,
    run_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        pool: SqlitePool,
        vectors: Arc<VectorStore>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            pool,
            vectors,
            llm,
            window_chars: config.chunking.window_chars,
            overlap_chars: config.chunking.overlap_chars,
            max_analysis_chars: config.llm.max_analysis_chars,
            run_timeout: Duration::from_secs(config.server.ingest_timeout_secs),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Start a background ingestion run for `job`.
    ///
    /// Returns `None` when the document is already being ingested (the
    /// double-trigger guard). The returned handle lets tests await
    /// completion instead of racing a detached task.
    pub fn spawn(self: &Arc<Self>, job: IngestJob) -> Option<JoinHandle<()>> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(job.document_id.clone()) {
                info!(document_id = %job.document_id, "ingestion already in flight, ignoring trigger");
                return None;
            }
        }

        let ingestor = Arc::clone(self);
        Some(tokio::spawn(async move {
            // Released on every task exit, panics included; a crashed run
            // must not leave the document locked against re-triggering.
            let _guard = InFlightGuard {
                ingestor: Arc::clone(&ingestor),
                document_id: job.document_id.clone(),
            };

            match tokio::time::timeout(ingestor.run_timeout, ingestor.run(&job)).await {
                Ok(Ok(chunk_count)) => {
                    info!(document_id = %job.document_id, chunk_count, "document ingestion complete");
                }
                Ok(Err(e)) => {
                    error!(document_id = %job.document_id, "document ingestion failed: {e:#}");
                }
                Err(_) => {
                    error!(document_id = %job.document_id, "document ingestion timed out");
                }
            }
        }))
    }

    /// Execute the pipeline for one document. On success the record holds
    /// the extracted text and analysis; on error the placeholder survives.
    pub async fn run(&self, job: &IngestJob) -> Result<u64> {
        info!(document_id = %job.document_id, case_id = %job.case_id, stage = %IngestStage::Extracting, "ingesting {}", job.filename);

        let bytes = tokio::fs::read(&job.stored_path)
            .await
            .with_context(|| format!("reading stored file {}", job.stored_path.display()))?;

        let full_text = extract::extract_text(&bytes, &job.filename)
            .map_err(|e| anyhow::anyhow!("{} failed: {}", IngestStage::Extracting, e))?;

        info!(document_id = %job.document_id, stage = %IngestStage::ChunkingEmbedding, chars = full_text.len(), "splitting and embedding");

        let inserts: Vec<ChunkInsert> = chunk_windows(&full_text, self.window_chars, self.overlap_chars)
            .enumerate()
            .map(|(i, window)| ChunkInsert {
                text: window.to_string(),
                chunk_index: i as i64,
                meta: ChunkMeta {
                    case_id: job.case_id.clone(),
                    document_id: job.document_id.clone(),
                },
            })
            .collect();

        let chunk_count = self
            .vectors
            .upsert(&inserts)
            .await
            .map_err(|e| anyhow::anyhow!("{} failed: {e:#}", IngestStage::ChunkingEmbedding))?;

        info!(document_id = %job.document_id, stage = %IngestStage::Analyzing, "running legal analysis");

        // Degrades to the sentinel object internally; never fails the run.
        let analysis = analyze_document(self.llm.as_ref(), &full_text, self.max_analysis_chars).await;

        cases::mark_document_processed(
            &self.pool,
            &job.document_id,
            &full_text,
            &analysis.to_string(),
        )
        .await
        .context("writing processed document record")?;

        Ok(chunk_count)
    }
}
