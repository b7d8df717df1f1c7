//! Query orchestration: retrieval → context → answer → citations.
//!
//! [`QueryService::process_query`] runs a weighted search, builds the
//! context string handed to the [`AnswerGenerator`], and turns the same
//! ranked hits into [`Citation`]s. The generator only ever sees hits that
//! passed the threshold and made the top `k`.
//!
//! Failure semantics:
//!
//! - Retrieval errors propagate (`Err`): the query failed.
//! - No hits: a fixed answer with no citations; the generator is not called.
//! - Generator errors are caught and become the answer text.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::index::NearestNeighborIndex;
use crate::models::SearchHit;
use crate::vectorstore::VectorStore;

/// Answer returned when retrieval finds nothing above the threshold.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find relevant information to answer your query.";

/// Maximum characters of chunk content kept in a citation.
pub const CITATION_MAX_CHARS: usize = 200;

/// Appended to citation content that was cut.
pub const TRUNCATION_MARKER: &str = "...";

/// Instruction given to the answer generator.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on provided resume and career documents. \
Use only the information provided in the context to answer questions. \
If you cannot answer based on the context, say so clearly. \
Be concise and professional.";

/// Free-text answer synthesis from an instruction and a prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// A question plus retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.7
}

impl QueryRequest {
    /// A request with the default `top_k` (5) and `threshold` (0.7).
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

/// Source attribution for one retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk content, cut to [`CITATION_MAX_CHARS`] plus [`TRUNCATION_MARKER`].
    pub content: String,
    pub source_system: String,
    pub classification: String,
    pub file_path: String,
    /// Weighted score when available, raw similarity otherwise.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub query: String,
}

/// One `[<classification>] From <source>: <content>` line per hit, in ranked
/// order, separated by blank lines.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[{}] From {}: {}",
                hit.metadata.classification, hit.metadata.source_system, hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One citation per hit, in ranked order.
pub fn build_citations(hits: &[SearchHit]) -> Vec<Citation> {
    hits.iter()
        .map(|hit| Citation {
            content: truncate_content(&hit.content),
            source_system: hit.metadata.source_system.clone(),
            classification: hit.metadata.classification.clone(),
            file_path: hit.metadata.file_path.clone(),
            score: hit.effective_score(),
        })
        .collect()
}

/// Cut `content` to [`CITATION_MAX_CHARS`] characters, marking the cut.
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(CITATION_MAX_CHARS) {
        Some((byte_pos, _)) => format!("{}{}", &content[..byte_pos], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

/// The user turn sent to the generator.
pub fn build_user_prompt(query: &str, context: &str) -> String {
    format!(
        "Context information:\n{}\n\nQuestion: {}\n\nPlease provide a clear, concise answer based only on the context information provided.",
        context, query
    )
}

/// Runs queries against a store with a fixed answer generator.
#[derive(Clone)]
pub struct QueryService {
    generator: Arc<dyn AnswerGenerator>,
}

impl QueryService {
    pub fn new(generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { generator }
    }

    /// Retrieve, generate, and cite.
    ///
    /// # Errors
    ///
    /// Only retrieval failures; generator failures become the answer text.
    pub async fn process_query<I: NearestNeighborIndex>(
        &self,
        store: &VectorStore<I>,
        request: &QueryRequest,
    ) -> StoreResult<QueryResponse> {
        let hits = store
            .weighted_search(&request.query, request.top_k, request.threshold)
            .await?;

        if hits.is_empty() {
            debug!(query = %request.query, "no chunks above threshold");
            return Ok(QueryResponse {
                answer: NO_RESULTS_ANSWER.to_string(),
                citations: Vec::new(),
                query: request.query.clone(),
            });
        }

        let context = build_context(&hits);
        let answer = self.generate_answer(&request.query, &context).await;

        Ok(QueryResponse {
            answer,
            citations: build_citations(&hits),
            query: request.query.clone(),
        })
    }

    async fn generate_answer(&self, query: &str, context: &str) -> String {
        let user_prompt = build_user_prompt(query, context);
        match self.generator.generate(SYSTEM_PROMPT, &user_prompt).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                format!("Error generating response: {}", e)
            }
        }
    }
}
