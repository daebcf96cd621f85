use serde::Serialize;

use crate::dataset::Dataset;
use crate::embeddings::SharedEmbedder;
use crate::error::RelevanceError;
use crate::relevance::signature::column_signatures;
use crate::relevance::{score_texts, stable_argmax};

/// The column a query is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMatch {
    pub index: usize,
    pub name: String,
    pub score: f32,
}

/// Fine step: ranks every column of the selected dataset.
pub struct ColumnResolver {
    embedder: SharedEmbedder,
}

impl ColumnResolver {
    pub fn new(embedder: SharedEmbedder) -> Self {
        Self { embedder }
    }

    pub fn score_columns(&self, dataset: &Dataset, query: &str) -> Result<Vec<f32>, RelevanceError> {
        if dataset.columns().is_empty() {
            return Err(RelevanceError::EmptyInput(dataset.id().to_string()));
        }
        score_texts(self.embedder.as_ref(), query, &column_signatures(dataset))
    }

    /// A dataset without columns is malformed input and an error here.
    pub fn resolve(&self, dataset: &Dataset, query: &str) -> Result<ColumnMatch, RelevanceError> {
        let scores = self.score_columns(dataset, query)?;
        let index = stable_argmax(&scores).ok_or_else(|| RelevanceError::EmptyInput(dataset.id().to_string()))?;

        let found = ColumnMatch {
            index,
            name: dataset.columns()[index].clone(),
            score: scores[index],
        };
        log::info!("Most relevant column: {} (similarity: {:.2})", found.name, found.score);
        Ok(found)
    }
}
