use crate::answer::record::AnswerRecord;

const NO_ANSWER: &str = "Não foi possível gerar uma resposta.";

/// Render the record for the end user: the answer, then one detail line per
/// analysis entry. Failures become a single `Erro: <message>` line.
pub fn format_response(record: &AnswerRecord) -> String {
    let answer = match record {
        AnswerRecord::Failed { error } => return format!("Erro: {error}"),
        AnswerRecord::Answered(a) => a,
    };

    let mut out = answer.answer.clone().unwrap_or_else(|| NO_ANSWER.to_string());
    if let Some(analysis) = answer.analysis.as_ref().filter(|a| !a.is_empty()) {
        let details: Vec<String> = analysis.0.iter().map(|(k, v)| format!("- {k}: {v}")).collect();
        out.push_str("\n\nDetalhes:\n");
        out.push_str(&details.join("\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::record::{Analysis, AnalysisValue, Answer};
    use crate::dataset::RowSample;

    fn answered(answer: Option<&str>, analysis: Option<Analysis>) -> AnswerRecord {
        AnswerRecord::Answered(Answer {
            query: "q".into(),
            selected_column: Some("valor".into()),
            answer: answer.map(str::to_string),
            analysis,
            data_sample: RowSample::default(),
        })
    }

    #[test]
    fn test_error_is_surfaced_verbatim() {
        let rec = AnswerRecord::Failed { error: "boom".into() };
        assert_eq!(format_response(&rec), "Erro: boom");
    }

    #[test]
    fn test_answer_with_details() {
        let rec = answered(
            Some("O total de valor é 50.00"),
            Some(Analysis::single("total_valor".into(), AnalysisValue::Number(50.0))),
        );
        assert_eq!(
            format_response(&rec),
            "O total de valor é 50.00\n\nDetalhes:\n- total_valor: 50.0"
        );
    }

    #[test]
    fn test_answer_without_analysis() {
        let rec = answered(Some("A coluna nome não é numérica."), None);
        assert_eq!(format_response(&rec), "A coluna nome não é numérica.");
    }

    #[test]
    fn test_missing_answer_placeholder() {
        let rec = answered(None, Some(Analysis::default()));
        assert_eq!(format_response(&rec), NO_ANSWER);
    }
}
