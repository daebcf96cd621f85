// dataset/ — In-memory tables loaded from the uploaded CSV files.
//
// Provides:
// - Cell and table model (column names lower-cased, row order preserved)
// - CSV loading with encoding/delimiter detection
// - ZIP extraction and CSV discovery

pub mod archive;
pub mod loader;

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::DatasetError;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Type a raw CSV field: integer, then float (dot or comma decimal), else text.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return CellValue::Empty;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Int(i);
        }
        if let Some(f) = parse_decimal(s) {
            return CellValue::Float(f);
        }
        CellValue::Text(s.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn parse_decimal(s: &str) -> Option<f64> {
    // Reject things like "inf" / "NaN" that str::parse accepts.
    if !s.chars().any(|c| c.is_ascii_digit()) || s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    if let Ok(f) = s.parse::<f64>() {
        return Some(f);
    }
    // Brazilian exports use a comma as decimal separator.
    if s.matches(',').count() == 1 && !s.contains('.') {
        return s.replace(',', ".").parse::<f64>().ok();
    }
    None
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_str(""),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Float(v) => serializer.serialize_f64(*v),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One row as an ordered column-name → value mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSample(pub Vec<(String, CellValue)>);

impl RowSample {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl Serialize for RowSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A loaded table. Read-only once built.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Column names are lower-cased here; they must be unique afterwards.
    /// Rows are padded with empty cells (or truncated) to the column count.
    pub fn new(id: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, DatasetError> {
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_lowercase()).collect();
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].contains(c) {
                return Err(DatasetError::DuplicateColumn(c.clone()));
            }
        }

        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, CellValue::Empty);
                r
            })
            .collect();

        Ok(Self {
            id: id.into(),
            columns,
            rows,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.columns.iter().position(|c| *c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().filter_map(move |r| r.get(idx))
    }

    pub fn first_row(&self) -> RowSample {
        match self.rows.first() {
            Some(row) => RowSample(self.columns.iter().cloned().zip(row.iter().cloned()).collect()),
            None => RowSample::default(),
        }
    }

    /// Remove rows whose every cell is empty. Returns how many were dropped.
    pub fn drop_empty_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| r.iter().any(|c| !c.is_empty()));
        before - self.rows.len()
    }

    /// Up to `limit` distinct text renderings of a column, in first-seen order.
    pub fn unique_text_values(&self, idx: usize, limit: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(limit);
        for cell in self.column_values(idx) {
            if out.len() >= limit {
                break;
            }
            if cell.is_empty() {
                continue;
            }
            let text = cell.to_string();
            if !out.contains(&text) {
                out.push(text);
            }
        }
        out
    }

    /// A column is numeric when it has at least one non-empty cell and every
    /// non-empty cell is an integer or a float.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        let mut seen = false;
        for cell in self.column_values(idx) {
            match cell {
                CellValue::Empty => {}
                CellValue::Int(_) | CellValue::Float(_) => seen = true,
                CellValue::Text(_) => return false,
            }
        }
        seen
    }
}

#[cfg(test)]
pub(crate) fn dataset_of(id: &str, columns: &[&str], rows: Vec<Vec<CellValue>>) -> Dataset {
    Dataset::new(id, columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
}

#[cfg(test)]
pub(crate) fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_parse() {
        assert_eq!(CellValue::parse(""), CellValue::Empty);
        assert_eq!(CellValue::parse("  "), CellValue::Empty);
        assert_eq!(CellValue::parse("42"), CellValue::Int(42));
        assert_eq!(CellValue::parse("-7"), CellValue::Int(-7));
        assert_eq!(CellValue::parse("10.5"), CellValue::Float(10.5));
        assert_eq!(CellValue::parse("10,5"), CellValue::Float(10.5));
        assert_eq!(CellValue::parse("1e3"), CellValue::Float(1000.0));
        assert_eq!(CellValue::parse("NaN"), text("NaN"));
        assert_eq!(CellValue::parse("inf"), text("inf"));
        assert_eq!(CellValue::parse("1,234,5"), text("1,234,5"));
        assert_eq!(CellValue::parse("Caneta"), text("Caneta"));
        assert_eq!(CellValue::parse("12.345.678/0001-90"), text("12.345.678/0001-90"));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Int(3).to_string(), "3");
        assert_eq!(CellValue::Float(50.0).to_string(), "50.0");
        assert_eq!(CellValue::Float(19.5).to_string(), "19.5");
        assert_eq!(CellValue::Empty.to_string(), "");
        assert_eq!(text("Lápis").to_string(), "Lápis");
    }

    #[test]
    fn test_columns_lowercased_and_unique() {
        let ds = dataset_of("a.csv", &["Valor", "NOME"], vec![]);
        assert_eq!(ds.columns(), &["valor".to_string(), "nome".to_string()]);
        assert_eq!(ds.column("VALOR"), Some(0));

        let err = Dataset::new("b.csv", vec!["Valor".into(), "valor".into()], vec![]).unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateColumn(c) if c == "valor"));
    }

    #[test]
    fn test_rows_padded_to_width() {
        let ds = dataset_of("a.csv", &["a", "b"], vec![vec![CellValue::Int(1)]]);
        assert_eq!(ds.column_values(1).collect::<Vec<_>>(), vec![&CellValue::Empty]);
    }

    #[test]
    fn test_first_row_and_empty_dataset() {
        let ds = dataset_of("a.csv", &["a", "b"], vec![vec![CellValue::Int(1), text("x")]]);
        let row = ds.first_row();
        assert_eq!(row.get("a"), Some(&CellValue::Int(1)));
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"a":1,"b":"x"}"#);

        let empty = dataset_of("b.csv", &["a"], vec![]);
        assert!(empty.first_row().is_empty());
    }

    #[test]
    fn test_drop_empty_rows() {
        let mut ds = dataset_of(
            "a.csv",
            &["a", "b"],
            vec![
                vec![CellValue::Empty, CellValue::Empty],
                vec![CellValue::Int(1), CellValue::Empty],
                vec![CellValue::Empty, CellValue::Empty],
            ],
        );
        assert_eq!(ds.drop_empty_rows(), 2);
        assert_eq!(ds.num_rows(), 1);
    }

    #[test]
    fn test_unique_text_values_first_seen_order() {
        let ds = dataset_of(
            "a.csv",
            &["uf"],
            ["SP", "RJ", "SP", "", "MG", "RJ", "BA", "PR", "SC"]
                .iter()
                .map(|s| vec![CellValue::parse(s)])
                .collect(),
        );
        assert_eq!(ds.unique_text_values(0, 5), vec!["SP", "RJ", "MG", "BA", "PR"]);
        assert_eq!(ds.unique_text_values(0, 2), vec!["SP", "RJ"]);
    }

    #[test]
    fn test_numeric_column_rule() {
        let ds = dataset_of(
            "a.csv",
            &["valor", "nome", "vazio", "misto"],
            vec![
                vec![CellValue::Float(10.0), text("Ana"), CellValue::Empty, CellValue::Int(1)],
                vec![CellValue::Empty, text("Bia"), CellValue::Empty, text("dois")],
                vec![CellValue::Int(3), text("Caio"), CellValue::Empty, CellValue::Int(3)],
            ],
        );
        assert!(ds.is_numeric_column(0));
        assert!(!ds.is_numeric_column(1));
        assert!(!ds.is_numeric_column(2));
        assert!(!ds.is_numeric_column(3));
    }
}
