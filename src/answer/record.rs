use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::dataset::{CellValue, RowSample};

/// One analysis figure: an aggregate or a value listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisValue {
    Int(i64),
    Number(f64),
    Sample(Vec<CellValue>),
}

impl fmt::Display for AnalysisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisValue::Int(n) => write!(f, "{n}"),
            AnalysisValue::Number(n) => fmt::Display::fmt(&CellValue::Float(*n), f),
            AnalysisValue::Sample(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Ordered label → value pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis(pub Vec<(String, AnalysisValue)>);

impl Analysis {
    pub fn single(label: String, value: AnalysisValue) -> Self {
        Self(vec![(label, value)])
    }

    pub fn get(&self, label: &str) -> Option<&AnalysisValue> {
        self.0.iter().find(|(k, _)| k == label).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Analysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub query: String,
    pub selected_column: Option<String>,
    pub answer: Option<String>,
    pub analysis: Option<Analysis>,
    pub data_sample: RowSample,
}

/// Result of the answering stage. A failure carries only its message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerRecord {
    Answered(Answer),
    Failed { error: String },
}

impl AnswerRecord {
    pub fn error(&self) -> Option<&str> {
        match self {
            AnswerRecord::Failed { error } => Some(error),
            AnswerRecord::Answered(_) => None,
        }
    }

    pub fn answered(&self) -> Option<&Answer> {
        match self {
            AnswerRecord::Answered(a) => Some(a),
            AnswerRecord::Failed { .. } => None,
        }
    }
}
