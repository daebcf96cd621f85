use serde::Serialize;

use crate::config;
use crate::dataset::Dataset;
use crate::embeddings::SharedEmbedder;
use crate::error::RelevanceError;
use crate::relevance::signature::dataset_signature;
use crate::relevance::{score_texts, stable_argmax};

/// The dataset picked for a query, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub index: usize,
    pub id: String,
    pub score: f32,
}

/// Coarse step: ranks whole datasets by their signature (all names, leading values).
pub struct DatasetSelector {
    embedder: SharedEmbedder,
    column_cap: Option<usize>,
}

impl DatasetSelector {
    pub fn new(embedder: SharedEmbedder) -> Self {
        Self {
            embedder,
            column_cap: Some(config::relevance::SELECTION_COLUMN_CAP),
        }
    }

    /// `None` samples values from every column. Names are always included.
    pub fn with_column_cap(mut self, column_cap: Option<usize>) -> Self {
        self.column_cap = column_cap;
        self
    }

    /// Similarity of every dataset to the query, in input order.
    pub fn score_all(&self, datasets: &[Dataset], query: &str) -> Result<Vec<f32>, RelevanceError> {
        if datasets.is_empty() {
            return Ok(Vec::new());
        }
        let signatures: Vec<String> = datasets
            .iter()
            .map(|ds| dataset_signature(ds, self.column_cap))
            .collect();
        score_texts(self.embedder.as_ref(), query, &signatures)
    }

    /// Most similar dataset; `None` when there are no candidates.
    pub fn select(&self, datasets: &[Dataset], query: &str) -> Result<Option<Selection>, RelevanceError> {
        Ok(self.rank(datasets, query)?.1)
    }

    /// Every score plus the selection, from a single embedding pass.
    pub fn rank(
        &self,
        datasets: &[Dataset],
        query: &str,
    ) -> Result<(Vec<f32>, Option<Selection>), RelevanceError> {
        log::info!("Selecting dataset among {} candidates for query: {}", datasets.len(), query);

        let scores = self.score_all(datasets, query)?;
        let Some(index) = stable_argmax(&scores) else {
            log::warn!("No candidate datasets for selection");
            return Ok((scores, None));
        };

        for (ds, score) in datasets.iter().zip(&scores) {
            log::debug!("  {:.4} {}", score, ds.id());
        }

        let selection = Selection {
            index,
            id: datasets[index].id().to_string(),
            score: scores[index],
        };
        log::info!("Selected dataset: {} (similarity: {:.2})", selection.id, selection.score);
        Ok((scores, Some(selection)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dataset::{dataset_of, text, CellValue};
    use crate::embeddings::provider::HashEmbedder;

    fn selector() -> DatasetSelector {
        DatasetSelector::new(Arc::new(HashEmbedder::new(4096)))
    }

    fn cabecalho() -> Dataset {
        dataset_of(
            "cabecalho.csv",
            &["chave", "emitente", "valor"],
            vec![
                vec![text("3524"), text("Papelaria Central"), CellValue::Float(150.0)],
                vec![text("3525"), text("Livraria Sol"), CellValue::Float(80.5)],
            ],
        )
    }

    fn itens() -> Dataset {
        dataset_of(
            "itens.csv",
            &["produto", "quantidade", "unidade"],
            vec![
                vec![text("Caneta"), CellValue::Int(10), text("UN")],
                vec![text("Caderno"), CellValue::Int(3), text("UN")],
            ],
        )
    }

    #[test]
    fn test_empty_input_is_no_selection() {
        assert_eq!(selector().select(&[], "qualquer coisa").unwrap(), None);
    }

    #[test]
    fn test_selects_dataset_sharing_query_terms() {
        let datasets = vec![cabecalho(), itens()];
        let sel = selector().select(&datasets, "Qual PRODUTO tem maior quantidade?").unwrap().unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.id, "itens.csv");
        assert!(sel.score > 0.0);
    }

    #[test]
    fn test_always_returns_a_candidate() {
        let datasets = vec![cabecalho(), itens()];
        for q in ["", "xyz", "emitente", "caneta"] {
            let sel = selector().select(&datasets, q).unwrap().unwrap();
            assert!(sel.index < datasets.len());
            assert_eq!(sel.id, datasets[sel.index].id());
        }
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let a = itens();
        let b = Dataset::new("copia.csv", a.columns().to_vec(), vec![]).unwrap();
        let c = Dataset::new("copia2.csv", a.columns().to_vec(), vec![]).unwrap();
        let sel = selector().select(&[b, c], "produto").unwrap().unwrap();
        assert_eq!(sel.index, 0);
        assert_eq!(sel.id, "copia.csv");
    }

    #[test]
    fn test_repeated_selection_is_deterministic() {
        let datasets = vec![cabecalho(), itens()];
        let s = selector();
        let first = s.select(&datasets, "valor da nota").unwrap();
        let second = s.select(&datasets, "valor da nota").unwrap();
        assert_eq!(first, second);
        assert_eq!(s.score_all(&datasets, "valor da nota").unwrap(), s.score_all(&datasets, "valor da nota").unwrap());
    }

    fn largo() -> Dataset {
        dataset_of(
            "largo.csv",
            &["a", "b", "c", "municipio"],
            vec![vec![text("x"), text("y"), text("z"), text("Campinas")]],
        )
    }

    #[test]
    fn test_trailing_column_name_still_counts() {
        let datasets = vec![largo()];
        let capped = selector().score_all(&datasets, "municipio").unwrap();
        assert!(capped[0] > 0.0);
    }

    #[test]
    fn test_column_cap_hides_trailing_values() {
        let datasets = vec![largo()];

        let capped = selector().score_all(&datasets, "campinas").unwrap();
        assert_eq!(capped[0], 0.0);

        let uncapped = selector()
            .with_column_cap(None)
            .score_all(&datasets, "campinas")
            .unwrap();
        assert!(uncapped[0] > 0.0);
    }

    #[test]
    fn test_shared_leading_columns_do_not_decide_selection() {
        let shared = ["chave de acesso", "modelo", "serie"];
        let row = || vec![text("3524 0001"), text("55"), text("1")];

        let mut cab_cols = shared.to_vec();
        cab_cols.extend(["valor nota fiscal", "uf emitente"]);
        let mut cab_row = row();
        cab_row.extend([CellValue::Float(150.0), text("SP")]);
        let cabecalho = dataset_of("cabecalho.csv", &cab_cols, vec![cab_row]);

        let mut itens_cols = shared.to_vec();
        itens_cols.extend(["descricao do produto", "quantidade"]);
        let mut itens_row = row();
        itens_row.extend([text("Caneta"), CellValue::Int(10)]);
        let itens = dataset_of("itens.csv", &itens_cols, vec![itens_row]);

        let sel = selector()
            .select(&[cabecalho, itens], "qual a quantidade de produto por descricao?")
            .unwrap()
            .unwrap();
        assert_eq!(sel.id, "itens.csv");
    }

    #[test]
    fn test_rank_agrees_with_select() {
        let datasets = vec![cabecalho(), itens()];
        let s = selector();
        let (scores, selected) = s.rank(&datasets, "quantidade de produto").unwrap();
        assert_eq!(scores, s.score_all(&datasets, "quantidade de produto").unwrap());
        assert_eq!(selected, s.select(&datasets, "quantidade de produto").unwrap());
        assert_eq!(selected.unwrap().index, 1);
    }
}
