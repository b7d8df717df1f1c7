//! Source-trust re-ranking.
//!
//! Raw similarity says nothing about how much a source is trusted: a
//! curated HR record and a scraped profile blurb with the same similarity
//! should not tie. Each hit's score is multiplied by its metadata `weight`
//! and the list is re-sorted on that product.

use crate::models::SearchHit;

/// Over-fetch factor applied before re-ranking, so that a lower-similarity
/// but higher-weight chunk can still reach the final top `k`.
pub const OVERFETCH_FACTOR: usize = 2;

/// Set `weighted_score = score * weight` on every hit, sort descending on
/// it, and keep the first `k`.
///
/// The sort is stable: hits with equal weighted scores keep their input
/// (raw similarity) order. Hits whose weighted score is not finite are
/// dropped.
pub fn rank_by_weight(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    for hit in &mut hits {
        hit.weighted_score = Some(hit.score * hit.metadata.weight as f32);
    }

    hits.retain(|h| h.effective_score().is_finite());
    hits.sort_by(|a, b| b.effective_score().total_cmp(&a.effective_score()));
    hits.truncate(k);
    hits
}
