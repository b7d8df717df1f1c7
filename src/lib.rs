//! # Portfolio RAG
//!
//! Retrieval-augmented question answering over a person's career documents
//! (HR records, applicant-tracking exports, GitHub profile data).
//!
//! Documents from several source systems are classified, PII-masked per
//! source, chunked, embedded, and stored in a persisted vector index.
//! Queries retrieve the most relevant chunks, re-rank them by per-source
//! trust weight, and hand them to an answer generator, returning the answer
//! together with citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │   Sources    │──▶│ Transform+Chunk  │──▶│ Vector store │
//! │ hr/ats/github│   │ classify, mask   │   │ .index/.docs │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                                 ┌────────────────┤
//!                                 ▼                ▼
//!                          ┌────────────┐   ┌────────────┐
//!                          │  weighted  │──▶│   answer   │
//!                          │   search   │   │ + citations│
//!                          └────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! prag init                        # create an empty index
//! prag ingest                      # ingest hr/, ats/ and GitHub
//! prag add resume.md --source hr   # add a single file
//! prag search "kubernetes"         # ranked chunks
//! prag query "Which languages appear most often?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`commands`] | CLI command handlers |
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Application context owning the store |
//! | [`embedding`] | Embedding provider implementations |
//! | [`answer`] | Answer generators |
//! | [`storage`] | On-disk index artifacts |
//! | [`ingest`] | Directory and single-file ingestion |
//! | [`github`] | GitHub profile source |
//! | [`progress`] | Ingest progress reporting |
//! | [`retry`] | HTTP retry with backoff |
//!
//! Pure logic (models, transform rules, chunking, index, ranking, query
//! orchestration) lives in the `portfolio-rag-core` crate.

pub mod answer;
pub mod commands;
pub mod config;
pub mod context;
pub mod embedding;
pub mod github;
pub mod ingest;
pub mod progress;
pub mod retry;
pub mod storage;

pub use portfolio_rag_core as core;
