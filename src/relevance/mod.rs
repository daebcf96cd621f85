// relevance/ — Which dataset, and which column in it, a query is about.
//
// Both steps embed the lower-cased query once, embed candidate signatures in one
// batch, and take the stable argmax of the cosine scores.

pub mod resolver;
pub mod selector;
pub mod signature;

pub use resolver::{ColumnMatch, ColumnResolver};
pub use selector::{DatasetSelector, Selection};

use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::RelevanceError;

/// Cosine score of every text against the lower-cased query, in input order.
fn score_texts(embedder: &dyn Embedder, query: &str, texts: &[String]) -> Result<Vec<f32>, RelevanceError> {
    let query_vec = embedder
        .embed(&query.to_lowercase())
        .map_err(RelevanceError::Embedding)?;
    let vectors = embedder.embed_batch(texts).map_err(RelevanceError::Embedding)?;
    if vectors.len() != texts.len() {
        return Err(RelevanceError::BatchSize {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    Ok(vectors.iter().map(|v| cosine_similarity(&query_vec, v)).collect())
}

/// Index of the first maximum. NaN never beats a real score.
/// `None` only for an empty slice.
pub fn stable_argmax(scores: &[f32]) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] || (scores[best].is_nan() && !s.is_nan()) {
            best = i;
        }
    }
    Some(best)
}
