// pipeline.rs — One query, end to end: Extraction → Selection → Processing → Analysis → Response.
//
// Stages run strictly in order on the calling thread. Progress goes to a caller-owned
// sink; cancellation is cooperative and checked before every stage and between file
// loads. `run_with_timeout` moves a run onto a worker thread and gives up at a deadline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::answer::{format_response, AnswerRecord, QueryAnswerer};
use crate::config::{self, Settings};
use crate::dataset::archive::{collect_csv_paths, extract_zip, find_csv_files};
use crate::dataset::loader::{load_many, load_with_policy, LoadPolicy};
use crate::dataset::Dataset;
use crate::embeddings::SharedEmbedder;
use crate::error::PipelineError;
use crate::relevance::{ColumnMatch, ColumnResolver, DatasetSelector, Selection};

pub const NO_CSV_RESPONSE: &str = "Nenhum arquivo CSV relevante encontrado.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Selection,
    Processing,
    Analysis,
    Response,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extraction => "Extração",
            Stage::Selection => "Seleção",
            Stage::Processing => "Processamento",
            Stage::Analysis => "Análise",
            Stage::Response => "Resposta",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
    pub elapsed_ms: Option<u64>,
    /// Wall-clock `HH:MM:SS`.
    pub timestamp: String,
}

impl ProgressEvent {
    fn new(stage: Stage, status: StageStatus, message: String, elapsed: Option<Duration>) -> Self {
        Self {
            stage,
            status,
            message,
            elapsed_ms: elapsed.map(|d| d.as_millis() as u64),
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp, self.stage, self.message)?;
        if let Some(ms) = self.elapsed_ms {
            write!(f, " (Tempo gasto: {:.2} segundos)", ms as f64 / 1000.0)?;
        }
        Ok(())
    }
}

/// Where stage events go. The presentation layer owns whatever state it keeps.
pub trait ProgressSink {
    fn report(&self, event: ProgressEvent);
}

impl<F: Fn(ProgressEvent)> ProgressSink for F {
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // A receiver that hung up just stops listening.
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub zip_path: PathBuf,
    pub query: String,
}

/// Everything a run produced. `selected` is `None` when no CSV could be offered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub candidates: usize,
    pub selected: Option<Selection>,
    pub column: Option<ColumnMatch>,
    pub record: Option<AnswerRecord>,
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedFile {
    pub file: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub files: Vec<RankedFile>,
    pub selected: Option<Selection>,
}

pub struct Pipeline {
    embedder: SharedEmbedder,
    extract_root: PathBuf,
    load_policy: LoadPolicy,
}

impl Pipeline {
    pub fn new(embedder: SharedEmbedder, extract_root: PathBuf, load_policy: LoadPolicy) -> Self {
        Self {
            embedder,
            extract_root,
            load_policy,
        }
    }

    pub fn from_settings(embedder: SharedEmbedder, settings: &Settings) -> Self {
        let policy = if settings.skip_unreadable {
            LoadPolicy::SkipUnreadable
        } else {
            LoadPolicy::Abort
        };
        Self::new(embedder, settings.extract_dir(), policy)
    }

    pub fn run(
        &self,
        request: &QueryRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Outcome, PipelineError> {
        log::info!("Pipeline run for {} with query: {}", request.zip_path.display(), request.query);
        let scratch = ScratchDir::create(&self.extract_root);

        let csv_paths = run_stage(Stage::Extraction, progress, cancel, || {
            let extracted = extract_zip(&request.zip_path, scratch.path())?;
            Ok(collect_csv_paths(&extracted)?)
        }, |paths: &Vec<PathBuf>| format!("{} arquivo(s) CSV encontrado(s)", paths.len()))?;

        let (mut datasets, selected) = run_stage(Stage::Selection, progress, cancel, || {
            let datasets = self.load_candidates(&csv_paths, cancel)?;
            let selected = DatasetSelector::new(self.embedder.clone()).select(&datasets, &request.query)?;
            Ok((datasets, selected))
        }, |(_, selected): &(Vec<Dataset>, Option<Selection>)| match selected {
            Some(s) => format!("{} (similaridade: {:.2})", s.id, s.score),
            None => "Nenhum arquivo selecionado".to_string(),
        })?;

        let Some(selected) = selected else {
            let response = run_stage(Stage::Response, progress, cancel, || Ok(NO_CSV_RESPONSE.to_string()), |r: &String| r.clone())?;
            return Ok(Outcome {
                candidates: csv_paths.len(),
                selected: None,
                column: None,
                record: None,
                response,
            });
        };

        let dataset = run_stage(Stage::Processing, progress, cancel, || {
            let mut dataset = datasets.swap_remove(selected.index);
            let dropped = dataset.drop_empty_rows();
            if dropped > 0 {
                log::info!("Dropped {} empty rows from {}", dropped, dataset.id());
            }
            Ok(dataset)
        }, |ds: &Dataset| format!("{} linhas x {} colunas", ds.num_rows(), ds.columns().len()))?;

        let (column, record) = run_stage(Stage::Analysis, progress, cancel, || {
            let column = ColumnResolver::new(self.embedder.clone()).resolve(&dataset, &request.query)?;
            let record = QueryAnswerer::default().answer(&dataset, &column.name, &request.query);
            Ok((column, record))
        }, |(column, record): &(ColumnMatch, AnswerRecord)| match record.error() {
            Some(e) => format!("coluna {}: erro: {e}", column.name),
            None => format!("coluna {}", column.name),
        })?;

        let response = run_stage(Stage::Response, progress, cancel, || Ok(format_response(&record)), |r: &String| r.clone())?;

        Ok(Outcome {
            candidates: csv_paths.len(),
            selected: Some(selected),
            column: Some(column),
            record: Some(record),
            response,
        })
    }

    /// Score every CSV under `dir` against the query, keeping the file order.
    pub fn rank_directory(&self, dir: &Path, query: &str) -> Result<Ranking, PipelineError> {
        let paths = find_csv_files(dir)?;
        let datasets = load_many(&paths, self.load_policy)?;
        let (scores, selected) = DatasetSelector::new(self.embedder.clone()).rank(&datasets, query)?;

        let files = datasets
            .iter()
            .zip(scores)
            .map(|(ds, score)| RankedFile {
                file: ds.id().to_string(),
                score,
            })
            .collect();
        Ok(Ranking { files, selected })
    }

    fn load_candidates(&self, paths: &[PathBuf], cancel: &CancelToken) -> Result<Vec<Dataset>, PipelineError> {
        let mut out = Vec::with_capacity(paths.len());
        for p in paths {
            cancel.check()?;
            if let Some(ds) = load_with_policy(p, self.load_policy)? {
                out.push(ds);
            }
        }
        Ok(out)
    }
}

fn run_stage<T>(
    stage: Stage,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
    body: impl FnOnce() -> Result<T, PipelineError>,
    summary: impl FnOnce(&T) -> String,
) -> Result<T, PipelineError> {
    cancel.check()?;
    progress.report(ProgressEvent::new(stage, StageStatus::Started, "Iniciado".to_string(), None));
    let started = Instant::now();

    match body() {
        Ok(value) => {
            let elapsed = started.elapsed();
            let message = format!("Concluído: {}", summary(&value));
            log::info!("[{}] {} ({:.2}s)", stage, message, elapsed.as_secs_f64());
            progress.report(ProgressEvent::new(stage, StageStatus::Completed, message, Some(elapsed)));
            Ok(value)
        }
        Err(e) => {
            let elapsed = started.elapsed();
            log::error!("[{}] failed after {:.2}s: {}", stage, elapsed.as_secs_f64(), e);
            progress.report(ProgressEvent::new(stage, StageStatus::Failed, format!("Erro: {e}"), Some(elapsed)));
            Err(e)
        }
    }
}

/// Per-run extraction directory, removed when the run ends.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(root: &Path) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%f");
        Self(root.join(format!("run-{stamp}")))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.0) {
                log::warn!("Could not remove {}: {}", self.0.display(), e);
            }
        }
    }
}

enum WorkerMsg {
    Progress(ProgressEvent),
    Done(Result<Outcome, PipelineError>),
}

/// Run on a worker thread, forwarding progress to `progress` from the calling
/// thread. At the deadline the run is cancelled and `Timeout` returned; the worker
/// stops at its next cancellation check.
pub fn run_with_timeout(
    pipeline: Arc<Pipeline>,
    request: QueryRequest,
    timeout: Duration,
    progress: &dyn ProgressSink,
) -> Result<Outcome, PipelineError> {
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let (tx, rx) = mpsc::channel::<WorkerMsg>();

    let worker = thread::Builder::new()
        .name(config::pipeline::WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let report = |event: ProgressEvent| {
                let _ = tx.send(WorkerMsg::Progress(event));
            };
            let result = pipeline.run(&request, &report, &worker_cancel);
            let _ = tx.send(WorkerMsg::Done(result));
        })
        .map_err(|e| {
            log::error!("Failed to spawn pipeline worker: {}", e);
            PipelineError::WorkerLost
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(WorkerMsg::Progress(event)) => progress.report(event),
            Ok(WorkerMsg::Done(result)) => {
                if worker.join().is_err() {
                    log::warn!("Pipeline worker panicked after sending its result");
                }
                return result;
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Query timed out after {:.1}s, cancelling", timeout.as_secs_f64());
                cancel.cancel();
                return Err(PipelineError::Timeout(timeout.as_secs_f64()));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(PipelineError::WorkerLost),
        }
    }
}
