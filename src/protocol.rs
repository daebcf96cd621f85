use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::ProgressEvent;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct ResponseOk<T: Serialize> {
    pub id: String,
    pub result: T,
}

#[derive(Debug, Serialize)]
pub struct ResponseErr {
    pub id: String,
    pub error: String,
}

/// Interim frame sent while an `ask` is running; the final frame carries `result`.
#[derive(Debug, Serialize)]
pub struct ProgressFrame<'a> {
    pub id: &'a str,
    pub progress: &'a ProgressEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskParams {
    pub zip_path: PathBuf,
    pub query: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectParams {
    pub dir: PathBuf,
    pub query: String,
}
