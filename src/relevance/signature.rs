// signature.rs — Text signatures embedded for relevance scoring.
//
// A column signature is its name plus a few distinct sample values. A dataset
// signature names every column but samples values from the leading ones only.

use crate::config::relevance::{
    COLUMN_SIGNATURE_PREFIX, COLUMN_SIGNATURE_VALUES, DATASET_SAMPLE_PREFIX, DATASET_SIGNATURE_SEPARATOR,
    SIGNATURE_SAMPLE_VALUES,
};
use crate::dataset::Dataset;

/// `"Coluna: <name>. Valores: v1, v2, ..."` with up to five distinct values.
pub fn column_signature(dataset: &Dataset, idx: usize) -> String {
    let name = &dataset.columns()[idx];
    let values = dataset.unique_text_values(idx, SIGNATURE_SAMPLE_VALUES);
    format!(
        "{COLUMN_SIGNATURE_PREFIX} {name}. {COLUMN_SIGNATURE_VALUES} {}",
        values.join(", ")
    )
    .trim_end()
    .to_string()
}

pub fn column_signatures(dataset: &Dataset) -> Vec<String> {
    (0..dataset.columns().len())
        .map(|i| column_signature(dataset, i))
        .collect()
}

/// Every column name, then sample values for the first `column_cap` columns
/// (all columns when `None`): `"Coluna: a. Coluna: b. Amostra de a: v1, v2"`.
pub fn dataset_signature(dataset: &Dataset, column_cap: Option<usize>) -> String {
    let width = dataset.columns().len();
    let n = column_cap.map(|c| c.min(width)).unwrap_or(width);

    let names = dataset
        .columns()
        .iter()
        .map(|name| format!("{COLUMN_SIGNATURE_PREFIX} {name}."));
    let samples = (0..n).map(|i| {
        let values = dataset.unique_text_values(i, SIGNATURE_SAMPLE_VALUES);
        format!("{DATASET_SAMPLE_PREFIX} {}: {}", dataset.columns()[i], values.join(", "))
            .trim_end()
            .to_string()
    });
    names.chain(samples).collect::<Vec<_>>().join(DATASET_SIGNATURE_SEPARATOR)
}
