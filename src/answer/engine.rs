use crate::answer::intent::{Intent, SumKind};
use crate::answer::record::{Analysis, AnalysisValue, Answer, AnswerRecord};
use crate::config;
use crate::dataset::{CellValue, Dataset};
use crate::error::AnalysisError;

/// Computes the answer for a resolved column. Never fails: problems become
/// `AnswerRecord::Failed`.
pub struct QueryAnswerer {
    lookup_rows: usize,
}

impl Default for QueryAnswerer {
    fn default() -> Self {
        Self {
            lookup_rows: config::analysis::LOOKUP_SAMPLE_ROWS,
        }
    }
}

impl QueryAnswerer {
    pub fn answer(&self, dataset: &Dataset, column: &str, query: &str) -> AnswerRecord {
        log::info!("Analysing column '{}' for query: {}", column, query);
        match self.try_answer(dataset, column, query) {
            Ok(a) => {
                log::info!("Analysis complete. Answer: {}", a.answer.as_deref().unwrap_or("<none>"));
                AnswerRecord::Answered(a)
            }
            Err(e) => {
                log::error!("Analysis failed: {}", e);
                AnswerRecord::Failed { error: e.to_string() }
            }
        }
    }

    fn try_answer(&self, dataset: &Dataset, column: &str, query: &str) -> Result<Answer, AnalysisError> {
        let col = column.to_lowercase();
        let idx = dataset
            .column(&col)
            .ok_or_else(|| AnalysisError::MissingColumn(col.clone()))?;

        let mut out = Answer {
            query: query.to_string(),
            selected_column: Some(col.clone()),
            answer: None,
            analysis: None,
            data_sample: dataset.first_row(),
        };

        match Intent::classify(query) {
            Intent::AggregateSum(kind) => {
                if !dataset.is_numeric_column(idx) {
                    out.answer = Some(format!("A coluna {col} não é numérica."));
                    return Ok(out);
                }

                let (sum, shown) = sum_column(dataset, idx, &col, kind.decimals())?;
                out.answer = Some(match kind {
                    SumKind::Total => format!("O total de {col} é {shown}"),
                    SumKind::Quantity => format!("A quantidade total de {col} é {shown}"),
                });
                out.analysis = Some(Analysis::single(format!("total_{col}"), sum));
            }
            Intent::GenericLookup => {
                let sample: Vec<CellValue> = dataset.column_values(idx).take(self.lookup_rows).cloned().collect();
                let listed: Vec<String> = sample.iter().map(|v| v.to_string()).collect();
                out.answer = Some(format!("Dados relevantes em '{col}': {}", listed.join(", ")));
                out.analysis = Some(Analysis::single(format!("sample_{col}"), AnalysisValue::Sample(sample)));
            }
        }

        Ok(out)
    }
}

/// The column total and its display text. Integer columns sum exactly in i64;
/// any float cell switches to f64.
fn sum_column(
    dataset: &Dataset,
    idx: usize,
    col: &str,
    decimals: usize,
) -> Result<(AnalysisValue, String), AnalysisError> {
    let all_int = dataset
        .column_values(idx)
        .all(|v| matches!(v, CellValue::Int(_) | CellValue::Empty));

    if all_int {
        let mut total: i64 = 0;
        for v in dataset.column_values(idx) {
            if let CellValue::Int(n) = v {
                total = total
                    .checked_add(*n)
                    .ok_or_else(|| AnalysisError::IntegerOverflow(col.to_string()))?;
            }
        }
        return Ok((AnalysisValue::Int(total), format_grouped_int(total, decimals)));
    }

    let sum: f64 = dataset.column_values(idx).filter_map(CellValue::as_f64).sum();
    if !sum.is_finite() {
        return Err(AnalysisError::NonFiniteAggregate(col.to_string()));
    }
    Ok((AnalysisValue::Number(sum), format_grouped(sum, decimals)))
}

/// Fixed decimals with ',' grouping the thousands: `1234.5` → `1,234.50`.
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let grouped = group_thousands(int_part);
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Same layout as [`format_grouped`], without going through f64.
pub fn format_grouped_int(value: i64, decimals: usize) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if decimals == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{}", "0".repeat(decimals))
    }
}

fn group_thousands(digits: &str) -> String {
    let digits: Vec<char> = digits.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    grouped
}
