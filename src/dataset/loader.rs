// loader.rs — CSV loading with encoding and delimiter detection.
//
// Invoice exports come from different ERPs: UTF-8 or Latin-1, comma or semicolon
// separated, comma as decimal separator. Every encoding is tried in order; for each
// one the delimiter is sniffed from the head of the file, with ';' as fallback.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use crate::config;
use crate::dataset::{CellValue, Dataset};
use crate::error::LoadError;

/// What to do when one of several files cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Fail the whole batch with the offending file's error.
    #[default]
    Abort,
    /// Log a warning and continue with the remaining files.
    SkipUnreadable,
}

pub fn load_csv(path: &Path) -> Result<Dataset, LoadError> {
    log::info!("Loading CSV {}", path.display());

    let bytes = std::fs::read(path).map_err(|e| LoadError {
        path: path.to_path_buf(),
        attempts: vec![format!("read: {e}")],
    })?;

    let id = path.display().to_string();
    let mut attempts = Vec::new();

    for label in config::csv::ENCODING_LABELS {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            attempts.push(format!("{label}: unknown encoding"));
            continue;
        };
        let Some(text) = decode_strict(encoding, &bytes) else {
            log::warn!("Decoding {} as {} failed", path.display(), label);
            attempts.push(format!("{label}: invalid byte sequence"));
            continue;
        };

        let sniffed = sniff_delimiter(&text);
        let mut delimiters = vec![sniffed.unwrap_or(config::csv::FALLBACK_DELIMITER)];
        if sniffed.is_some() && sniffed != Some(config::csv::FALLBACK_DELIMITER) {
            delimiters.push(config::csv::FALLBACK_DELIMITER);
        }

        for delimiter in delimiters {
            match parse_csv_text(&id, &text, delimiter) {
                Ok(ds) => {
                    log::info!(
                        "Loaded {} ({}, delimiter {:?}): {} rows x {} columns",
                        path.display(),
                        label,
                        delimiter as char,
                        ds.num_rows(),
                        ds.columns().len()
                    );
                    return Ok(ds);
                }
                Err(e) => {
                    log::warn!("Attempt with {} / {:?} failed for {}: {}", label, delimiter as char, path.display(), e);
                    attempts.push(format!("{label} / {:?}: {e}", delimiter as char));
                }
            }
        }
    }

    log::error!("Could not load {} with any supported encoding", path.display());
    Err(LoadError {
        path: path.to_path_buf(),
        attempts,
    })
}

/// `Ok(None)` when the file is unreadable and the policy skips it.
pub fn load_with_policy(path: &Path, policy: LoadPolicy) -> Result<Option<Dataset>, LoadError> {
    match load_csv(path) {
        Ok(ds) => Ok(Some(ds)),
        Err(e) if policy == LoadPolicy::SkipUnreadable => {
            log::warn!("Skipping unreadable CSV: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Load every path; with `Abort` the first failure ends the batch.
pub fn load_many(paths: &[PathBuf], policy: LoadPolicy) -> Result<Vec<Dataset>, LoadError> {
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        if let Some(ds) = load_with_policy(p, policy)? {
            out.push(ds);
        }
    }
    Ok(out)
}

fn decode_strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let (without_bom, bom_encoding) = match Encoding::for_bom(bytes) {
        Some((enc, len)) => (&bytes[len..], Some(enc)),
        None => (bytes, None),
    };
    let encoding = bom_encoding.unwrap_or(encoding);
    encoding
        .decode_without_bom_handling_and_without_replacement(without_bom)
        .map(|s| s.into_owned())
}

/// Pick the candidate that appears the same non-zero number of times on every
/// sampled line; highest count wins. `None` when nothing is consistent.
pub fn sniff_delimiter(text: &str) -> Option<u8> {
    let window: String = text.chars().take(config::csv::SNIFF_WINDOW_CHARS).collect();
    let mut lines: Vec<&str> = window.lines().filter(|l| !l.trim().is_empty()).collect();
    // The last line of the window is usually cut short.
    if lines.len() > 1 && window.chars().count() == config::csv::SNIFF_WINDOW_CHARS {
        lines.pop();
    }
    if lines.is_empty() {
        return None;
    }

    let mut best: Option<(u8, usize)> = None;
    for &cand in config::csv::SNIFF_CANDIDATES {
        let counts: Vec<usize> = lines.iter().map(|l| count_unquoted(l, cand)).collect();
        let first = counts[0];
        if first == 0 || counts.iter().any(|&c| c != first) {
            continue;
        }
        if best.map(|(_, n)| first > n).unwrap_or(true) {
            best = Some((cand, first));
        }
    }
    best.map(|(d, _)| d)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut n = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            n += 1;
        }
    }
    n
}

/// Parse decoded CSV text. Field counts must match the header.
pub fn parse_csv_text(id: &str, text: &str, delimiter: u8) -> anyhow::Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("no header row");
    }
    let headers = dedupe_headers(headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(CellValue::parse).collect());
    }

    Ok(Dataset::new(id, headers, rows)?)
}

/// Lower-case header names and suffix repeats with `.1`, `.2`, ...
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for h in headers {
        let base = h.to_lowercase();
        let mut name = base.clone();
        let mut n = 1;
        while out.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.join(name);
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(bytes).unwrap();
        p
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), Some(b','));
        assert_eq!(sniff_delimiter("a;b;c\n1,5;2;3\n"), Some(b';'));
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), Some(b'\t'));
        assert_eq!(sniff_delimiter("\"x;y\",b\n\"1;2\",3\n"), Some(b','));
        assert_eq!(sniff_delimiter("single\nvalue\n"), None);
        assert_eq!(sniff_delimiter(""), None);
    }

    #[test]
    fn test_load_semicolon_comma_decimal_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(
            dir.path(),
            "itens.csv",
            "Produto;Valor Unitário;Quantidade\nCaneta;1,50;10\nLápis;0,75;20\n".as_bytes(),
        );
        let ds = load_csv(&p).unwrap();
        assert_eq!(ds.columns(), &["produto", "valor unitário", "quantidade"]);
        assert_eq!(ds.num_rows(), 2);
        assert_eq!(ds.first_row().get("valor unitário"), Some(&CellValue::Float(1.5)));
        assert_eq!(ds.first_row().get("quantidade"), Some(&CellValue::Int(10)));
    }

    #[test]
    fn test_load_latin1_falls_through_utf8() {
        let dir = tempfile::tempdir().unwrap();
        // "Razão Social;UF\nPapelaria São João;SP\n" in ISO-8859-1.
        let mut bytes = b"Raz\xe3o Social;UF\nPapelaria S\xe3o Jo\xe3o;SP\n".to_vec();
        bytes.extend_from_slice(b"Livraria Central;RJ\n");
        let p = write_file(dir.path(), "emitentes.csv", &bytes);

        let ds = load_csv(&p).unwrap();
        assert_eq!(ds.columns()[0], "razão social");
        assert_eq!(ds.first_row().get("razão social"), Some(&CellValue::Text("Papelaria São João".into())));
    }

    #[test]
    fn test_load_utf8_bom() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"chave,valor\nabc,10\n");
        let p = write_file(dir.path(), "bom.csv", &bytes);
        let ds = load_csv(&p).unwrap();
        assert_eq!(ds.columns()[0], "chave");
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let ds = parse_csv_text("x.csv", "Valor;valor;VALOR\n1;2;3\n", b';').unwrap();
        assert_eq!(ds.columns(), &["valor", "valor.1", "valor.2"]);
    }

    #[test]
    fn test_unparseable_file_reports_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(dir.path(), "quebrado.csv", b"a;b\n1;2;3;4\n5\n");
        let err = load_csv(&p).unwrap_err();
        assert_eq!(err.path, p);
        assert!(!err.attempts.is_empty());
        assert!(err.to_string().contains("quebrado.csv"));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_csv(Path::new("/nonexistent/notas.csv")).unwrap_err();
        assert!(err.attempts[0].starts_with("read:"));
    }

    #[test]
    fn test_load_many_policies() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "ok.csv", b"a,b\n1,2\n");
        let bad = write_file(dir.path(), "bad.csv", b"a;b\n1;2;3\n");
        let paths = vec![good.clone(), bad.clone()];

        let err = load_many(&paths, LoadPolicy::Abort).unwrap_err();
        assert_eq!(err.path, bad);

        let loaded = load_many(&paths, LoadPolicy::SkipUnreadable).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id(), good.display().to_string());
    }
}
