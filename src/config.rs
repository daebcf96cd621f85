// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

// NOTE: HOST_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const HOST_VERSION: &str = "0.3.0";

pub const ENV_PREFIX: &str = "NFE_QUERY_";

pub mod logging {
    pub const LOG_DIR_REL: &str = ".nfe-query/logs";
    pub const LOG_FILE_NAME: &str = "nfe_query";
    pub const DEFAULT_LOG_SPEC: &str = "info";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod native_messaging {
    pub const MAX_MESSAGE_SIZE_BYTES: u32 = 16 * 1024 * 1024;
}

pub mod embedding {
    pub const EMBEDDING_DIMS: usize = 384;
    pub const EMBEDDING_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

    // Model context is 128 word-pieces for this checkpoint.
    pub const MAX_TOKENS: usize = 128;

    pub const MODEL_BASE_URL: &str =
        "https://huggingface.co/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2/resolve/main";

    pub const MODEL_DIR_REL: &str = ".nfe-query/models/paraphrase-multilingual-MiniLM-L12-v2";

    pub const WEIGHTS_FILE: &str = "model.safetensors";
    pub const TOKENIZER_FILE: &str = "tokenizer.json";
    pub const CONFIG_FILE: &str = "config.json";

    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
}

pub mod relevance {
    // Distinct sample values per column in a signature.
    pub const SIGNATURE_SAMPLE_VALUES: usize = 5;

    // Dataset-level selection only looks at the leading columns (coarse filter).
    pub const SELECTION_COLUMN_CAP: usize = 3;

    pub const COLUMN_SIGNATURE_PREFIX: &str = "Coluna:";
    pub const COLUMN_SIGNATURE_VALUES: &str = "Valores:";
    pub const DATASET_SAMPLE_PREFIX: &str = "Amostra de";
    pub const DATASET_SIGNATURE_SEPARATOR: &str = " ";
}

pub mod analysis {
    pub const TOTAL_KEYWORD: &str = "total";
    pub const QUANTITY_KEYWORD: &str = "quantidade";

    pub const TOTAL_DECIMALS: usize = 2;
    pub const QUANTITY_DECIMALS: usize = 0;

    pub const LOOKUP_SAMPLE_ROWS: usize = 5;
}

pub mod csv {
    // Tried in order; labels resolved through encoding_rs.
    pub const ENCODING_LABELS: &[&str] = &["utf-8", "latin1", "iso-8859-1"];

    pub const SNIFF_WINDOW_CHARS: usize = 1024;
    pub const SNIFF_CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];
    pub const FALLBACK_DELIMITER: u8 = b';';
}

pub mod pipeline {
    pub const DATA_DIR_REL: &str = ".nfe-query/data";
    pub const EXTRACT_SUBDIR: &str = "temp_extracted";

    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    pub const WORKER_THREAD_NAME: &str = "nfe-query-worker";
}

/// Runtime settings, read once at startup from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_spec: String,
    pub model_dir: PathBuf,
    pub model_base_url: String,
    pub model_pins: ModelPins,
    pub query_timeout: Duration,
    pub skip_unreadable: bool,
}

/// Optional SHA-256 pins for the downloaded model files.
#[derive(Debug, Clone, Default)]
pub struct ModelPins {
    pub safetensors: Option<String>,
    pub tokenizer: Option<String>,
    pub config: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env is the normal case.
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("failed reading .env");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let home = || home_dir().context("cannot determine home directory (neither HOME nor USERPROFILE is set)");

        let data_dir = match get("DATA_DIR") {
            Some(v) => PathBuf::from(v),
            None => home()?.join(pipeline::DATA_DIR_REL),
        };
        let log_dir = match get("LOG_DIR") {
            Some(v) => PathBuf::from(v),
            None => home()?.join(logging::LOG_DIR_REL),
        };
        let model_dir = match get("MODEL_DIR") {
            Some(v) => PathBuf::from(v),
            None => home()?.join(embedding::MODEL_DIR_REL),
        };

        let query_timeout = match get("TIMEOUT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("{ENV_PREFIX}TIMEOUT_SECS must be a whole number of seconds, got '{v}'"))?;
                if secs == 0 {
                    bail!("{ENV_PREFIX}TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(pipeline::DEFAULT_TIMEOUT_SECS),
        };

        let skip_unreadable = match get("SKIP_UNREADABLE") {
            Some(v) => parse_flag(&v).with_context(|| format!("{ENV_PREFIX}SKIP_UNREADABLE: invalid value '{v}'"))?,
            None => false,
        };

        Ok(Self {
            data_dir,
            log_dir,
            log_spec: get("LOG_LEVEL").unwrap_or_else(|| logging::DEFAULT_LOG_SPEC.to_string()),
            model_dir,
            model_base_url: get("MODEL_BASE_URL").unwrap_or_else(|| embedding::MODEL_BASE_URL.to_string()),
            model_pins: ModelPins {
                safetensors: get("MODEL_SHA256_SAFETENSORS"),
                tokenizer: get("MODEL_SHA256_TOKENIZER"),
                config: get("MODEL_SHA256_CONFIG"),
            },
            query_timeout,
            skip_unreadable,
        })
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.data_dir.join(pipeline::EXTRACT_SUBDIR)
    }
}

fn parse_flag(v: &str) -> anyhow::Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected one of 1/0, true/false, yes/no, on/off"),
    }
}

fn home_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("HOME") {
        if !v.is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    // Windows fallback
    if let Ok(v) = std::env::var("USERPROFILE") {
        if !v.is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_explicit_dirs_and_defaults() {
        let s = settings_from(&[
            ("DATA_DIR", "/tmp/nfe/data"),
            ("LOG_DIR", "/tmp/nfe/logs"),
            ("MODEL_DIR", "/tmp/nfe/model"),
        ])
        .unwrap();
        assert_eq!(s.data_dir, PathBuf::from("/tmp/nfe/data"));
        assert_eq!(s.extract_dir(), PathBuf::from("/tmp/nfe/data/temp_extracted"));
        assert_eq!(s.log_spec, "info");
        assert_eq!(s.model_base_url, embedding::MODEL_BASE_URL);
        assert_eq!(s.query_timeout, Duration::from_secs(pipeline::DEFAULT_TIMEOUT_SECS));
        assert!(!s.skip_unreadable);
        assert!(s.model_pins.safetensors.is_none());
    }

    #[test]
    fn test_overrides() {
        let s = settings_from(&[
            ("DATA_DIR", "/d"),
            ("LOG_DIR", "/l"),
            ("MODEL_DIR", "/m"),
            ("LOG_LEVEL", "debug"),
            ("TIMEOUT_SECS", "7"),
            ("SKIP_UNREADABLE", "yes"),
            ("MODEL_SHA256_CONFIG", "abc123"),
        ])
        .unwrap();
        assert_eq!(s.log_spec, "debug");
        assert_eq!(s.query_timeout, Duration::from_secs(7));
        assert!(s.skip_unreadable);
        assert_eq!(s.model_pins.config.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let base = [("DATA_DIR", "/d"), ("LOG_DIR", "/l"), ("MODEL_DIR", "/m")];

        let mut bad_timeout = base.to_vec();
        bad_timeout.push(("TIMEOUT_SECS", "soon"));
        let err = settings_from(&bad_timeout).unwrap_err();
        assert!(format!("{err:#}").contains("TIMEOUT_SECS"));

        let mut zero_timeout = base.to_vec();
        zero_timeout.push(("TIMEOUT_SECS", "0"));
        assert!(settings_from(&zero_timeout).is_err());

        let mut bad_flag = base.to_vec();
        bad_flag.push(("SKIP_UNREADABLE", "maybe"));
        assert!(settings_from(&bad_flag).is_err());
    }
}
