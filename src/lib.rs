//! # LexVault
//!
//! A case-scoped retrieval-augmented legal assistant service.
//!
//! LexVault ingests legal documents (PDF, plain text) into a per-case
//! vector index, answers chat questions grounded in the retrieved documents
//! of a single case, extracts structured legal metadata per document, and
//! synthesizes a strategy memo from the accumulated analyses.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │  Upload  │──▶│ Ingestion (background)   │──▶│  SQLite   │
//! │  (HTTP)  │   │ extract→chunk+embed→     │   │ cases +   │
//! └──────────┘   │ analyze→record update    │   │ vectors   │
//!                └──────────────────────────┘   └────┬──────┘
//!                                                    │
//!                    ┌───────────────────────────────┤
//!                    ▼                               ▼
//!               ┌──────────┐                   ┌──────────┐
//!               │   Chat   │  case-filtered    │ Strategy │
//!               │  (RAG)   │◀─ retrieval       │   memo   │
//!               └──────────┘                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping character-window chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Case-filterable chunk vector store |
//! | [`retriever`] | Case-scoped top-k retrieval |
//! | [`llm`] | Chat-completion and transcription clients |
//! | [`analyze`] | Structured legal document analysis |
//! | [`chat`] | Grounded chat responder |
//! | [`strategy`] | Case strategy generation |
//! | [`extract`] | PDF / plain-text extraction |
//! | [`ingest`] | Background document ingestion pipeline |
//! | [`cases`] | Relational store for cases, messages, documents |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod cases;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retriever;
pub mod server;
pub mod strategy;
pub mod vector_store;
