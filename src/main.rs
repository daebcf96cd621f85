mod answer;
mod config;
mod dataset;
mod embeddings;
mod error;
mod logging;
mod native_messaging;
mod pipeline;
mod protocol;
mod relevance;

use std::cell::RefCell;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use crate::config::Settings;
use crate::embeddings::engine::EmbeddingEngine;
use crate::embeddings::SharedEmbedder;
use crate::error::PipelineError;
use crate::pipeline::{run_with_timeout, Pipeline, ProgressEvent, QueryRequest};
use crate::protocol::{AskParams, ProgressFrame, ResponseErr, ResponseOk, SelectParams};

struct HostState {
    settings: Settings,
    pipeline: Option<Arc<Pipeline>>,
    should_exit: bool,
}

impl HostState {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            pipeline: None,
            should_exit: false,
        }
    }

    fn require_pipeline(&self) -> anyhow::Result<Arc<Pipeline>> {
        self.pipeline.clone().context("model not initialized. Call 'init' first.")
    }
}

fn main() {
    if let Err(e) = real_main() {
        // Keep stderr noisy for user bug reports; logs also go to file.
        eprintln!("[nfe_query] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let _logger = logging::init_logging(&settings)?;

    // One-shot mode for scripting: answer a single query and exit, no framing.
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "--ask" {
        let zip = read_arg_value(&args, "--zip").context("missing --zip")?;
        let query = read_arg_value(&args, "--query").context("missing --query")?;
        return run_cli(settings, PathBuf::from(zip), query);
    }

    log::info!("=== NF-e query host started ===");
    log::info!("Waiting for messages...");

    let mut state = HostState::new(settings);
    let mut in_stream = stdin();
    let mut out_stream = stdout();

    let mut message_count: u64 = 0;
    loop {
        let req = match native_messaging::read_message(&mut in_stream) {
            Ok(Some(r)) => r,
            Ok(None) => {
                log::info!("No more messages after {} messages, exiting", message_count);
                break;
            }
            Err(e) => {
                log::error!("Error reading message: {:?}", e);
                break;
            }
        };

        message_count += 1;
        log::info!("Processing message #{}: {} (id: {})", message_count, req.method, req.id);

        let resp = handle_request(&mut state, &req.method, &req.id, &req.params, &mut out_stream);
        match resp {
            Ok(v) => {
                if let Err(e) = native_messaging::write_json(&mut out_stream, &v) {
                    log::error!("Error sending response: {:?}", e);
                    break;
                }
                if state.should_exit {
                    log::info!("Exiting as requested by client");
                    break;
                }
            }
            Err(e) => {
                log::error!("Handler error: {:?}", e);
                let err = ResponseErr {
                    id: req.id.clone(),
                    error: format!("{e:#}"),
                };
                let _ = native_messaging::write_json(&mut out_stream, &err);
            }
        }
    }

    log::info!("=== NF-e query host stopped ===");
    Ok(())
}

fn handle_request(
    state: &mut HostState,
    method: &str,
    msg_id: &str,
    params: &Value,
    out: &mut dyn Write,
) -> anyhow::Result<Value> {
    match method {
        "hello" => handle_hello(state, msg_id, params),
        "init" => handle_init(state, msg_id),
        "ask" => handle_ask(state, msg_id, params, out),
        "select" => handle_select(state, msg_id, params),
        "shutdown" => handle_shutdown(state, msg_id),
        _ => Ok(serde_json::json!({ "id": msg_id, "error": format!("Unknown method: {method}") })),
    }
}

fn handle_hello(state: &HostState, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    let client_version = params.get("clientVersion").and_then(|v| v.as_str()).unwrap_or("unknown");
    log::info!(
        "Hello from client version {}, responding with host version {}",
        client_version,
        config::HOST_VERSION
    );

    Ok(serde_json::json!({
        "id": msg_id,
        "result": {
            "type": "hello-response",
            "hostImpl": "rust",
            "hostVersion": config::HOST_VERSION,
            "clientVersion": client_version,
            "model": config::embedding::EMBEDDING_MODEL_NAME,
            "hasModel": state.pipeline.is_some()
        }
    }))
}

fn handle_init(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    if state.pipeline.is_none() {
        let embedder = load_embedder(&state.settings)?;
        state.pipeline = Some(Arc::new(Pipeline::from_settings(embedder, &state.settings)));
    } else {
        log::info!("Model already loaded, reusing it");
    }

    Ok(serde_json::json!({
        "id": msg_id,
        "result": {
            "ok": true,
            "hasModel": true,
            "model": config::embedding::EMBEDDING_MODEL_NAME,
            "modelDir": state.settings.model_dir.to_string_lossy(),
            "dataDir": state.settings.data_dir.to_string_lossy(),
            "timeoutSecs": state.settings.query_timeout.as_secs()
        }
    }))
}

fn handle_ask(state: &HostState, msg_id: &str, params: &Value, out: &mut dyn Write) -> anyhow::Result<Value> {
    let params: AskParams = serde_json::from_value(params.clone()).context("invalid ask params")?;
    if params.query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }
    let pipeline = state.require_pipeline()?;
    let timeout = params
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.settings.query_timeout);

    let out = RefCell::new(out);
    let forward = |event: ProgressEvent| {
        let frame = ProgressFrame {
            id: msg_id,
            progress: &event,
        };
        let mut w = out.borrow_mut();
        if let Err(e) = native_messaging::write_json(&mut **w, &frame) {
            log::warn!("Failed sending progress frame: {:?}", e);
        }
    };

    let request = QueryRequest {
        zip_path: params.zip_path,
        query: params.query,
    };
    let outcome = run_with_timeout(pipeline, request, timeout, &forward)?;

    Ok(serde_json::to_value(ResponseOk {
        id: msg_id.to_string(),
        result: outcome,
    })?)
}

fn handle_select(state: &HostState, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    let params: SelectParams = serde_json::from_value(params.clone()).context("invalid select params")?;
    let pipeline = state.require_pipeline()?;
    let ranking = pipeline.rank_directory(&params.dir, &params.query)?;

    Ok(serde_json::to_value(ResponseOk {
        id: msg_id.to_string(),
        result: ranking,
    })?)
}

fn handle_shutdown(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    state.should_exit = true;
    Ok(serde_json::json!({ "id": msg_id, "result": { "ok": true } }))
}

fn load_embedder(settings: &Settings) -> Result<SharedEmbedder, PipelineError> {
    let model_dir = embeddings::download::ensure_model_files(settings).map_err(PipelineError::ModelUnavailable)?;
    let engine = EmbeddingEngine::load(&model_dir).map_err(PipelineError::ModelUnavailable)?;
    log::info!("Embedding engine loaded from {}", model_dir.display());
    Ok(Arc::new(engine))
}

fn run_cli(settings: Settings, zip_path: PathBuf, query: String) -> anyhow::Result<()> {
    let embedder = load_embedder(&settings)?;
    let pipeline = Arc::new(Pipeline::from_settings(embedder, &settings));

    let print = |event: ProgressEvent| eprintln!("{event}");
    let outcome = run_with_timeout(pipeline, QueryRequest { zip_path, query }, settings.query_timeout, &print)?;

    let mut out = stdout();
    writeln!(out, "{}", outcome.response)?;
    out.flush()?;
    Ok(())
}

fn read_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
