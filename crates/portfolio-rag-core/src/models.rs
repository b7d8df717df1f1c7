//! Core data models shared by ingestion, the vector store, and query
//! orchestration.

use serde::{Deserialize, Serialize};

/// Classification applied when a source has no configured rule.
pub const DEFAULT_CLASSIFICATION: &str = "PUBLIC";

/// Trust weight applied when a source has no configured rule.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Provenance and trust metadata attached to every chunk.
///
/// Built once by [`TransformRules::apply_transform`](crate::transform::TransformRules::apply_transform)
/// and copied into each chunk; never recomputed after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source system tag (e.g. `"hr"`, `"github"`, `"ats"`, `"upload"`).
    pub source_system: String,
    /// Display label such as `"PUBLIC"` or `"CONFIDENTIAL"`.
    pub classification: String,
    /// Trust multiplier applied at ranking time.
    pub weight: f64,
    /// Original path, suffixed with `#chunk_<i>` once split.
    pub file_path: String,
    /// Whether the source's rule requested PII masking.
    pub pii_masked: bool,
}

impl DocumentMetadata {
    /// Copy of this metadata for the `index`-th chunk of the same content.
    pub fn for_chunk(&self, index: usize) -> Self {
        Self {
            file_path: format!("{}#chunk_{}", self.file_path, index),
            ..self.clone()
        }
    }
}

/// A bounded piece of a source document: the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Final (possibly masked) text, exactly as embedded.
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Raw provider embedding. Filled on first insertion, then kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
            embedding: None,
        }
    }
}

/// A single retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Inner product of the normalized query and chunk vectors.
    pub score: f32,
    /// `score * metadata.weight`; set only by weighted ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_score: Option<f32>,
}

impl SearchHit {
    /// The score used for ranking and citations.
    pub fn effective_score(&self) -> f32 {
        self.weighted_score.unwrap_or(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMetadata {
        DocumentMetadata {
            source_system: "hr".to_string(),
            classification: "CONFIDENTIAL".to_string(),
            weight: 1.5,
            file_path: "hr/resume.md".to_string(),
            pii_masked: true,
        }
    }

    #[test]
    fn test_for_chunk_suffixes_path_only() {
        let m = meta().for_chunk(3);
        assert_eq!(m.file_path, "hr/resume.md#chunk_3");
        assert_eq!(m.source_system, "hr");
        assert_eq!(m.classification, "CONFIDENTIAL");
        assert_eq!(m.weight, 1.5);
        assert!(m.pii_masked);
    }

    #[test]
    fn test_chunk_without_embedding_omits_field() {
        let chunk = DocumentChunk::new("hello", meta());
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json.get("embedding").is_none());
        let back: DocumentChunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_effective_score_prefers_weighted() {
        let mut hit = SearchHit {
            content: String::new(),
            metadata: meta(),
            score: 0.8,
            weighted_score: None,
        };
        assert_eq!(hit.effective_score(), 0.8);
        hit.weighted_score = Some(1.2);
        assert_eq!(hit.effective_score(), 1.2);
    }
}
