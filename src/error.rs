use std::path::PathBuf;

use thiserror::Error;

/// A dataset file that could not be read under any supported encoding/delimiter.
#[derive(Debug, Error)]
#[error("failed to load {}: {}", .path.display(), .attempts.join("; "))]
pub struct LoadError {
    pub path: PathBuf,
    pub attempts: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to extract {entry} from {}: {message}", .path.display())]
    Extract {
        path: PathBuf,
        entry: String,
        message: String,
    },
    #[error("failed to scan {}: {message}", .path.display())]
    Scan { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("duplicate column '{0}' after lower-casing")]
    DuplicateColumn(String),
}

/// Failures while turning a query into an answer. These never leave the
/// answering stage: they are folded into an error record.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("coluna '{0}' não encontrada nos dados")]
    MissingColumn(String),
    #[error("soma de '{0}' não é um número finito")]
    NonFiniteAggregate(String),
    #[error("soma de '{0}' excede o limite de inteiros")]
    IntegerOverflow(String),
}

#[derive(Debug, Error)]
pub enum RelevanceError {
    #[error("dataset {0} has no columns")]
    EmptyInput(String),
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("embedding model returned {got} vectors for {expected} texts")]
    BatchSize { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding model unavailable: {0:#}")]
    ModelUnavailable(anyhow::Error),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Relevance(#[from] RelevanceError),
    #[error("query timed out after {0:.1}s")]
    Timeout(f64),
    #[error("query cancelled")]
    Cancelled,
    #[error("pipeline worker stopped unexpectedly")]
    WorkerLost,
}
