// engine.rs — Candle BERT embedding engine with attention-mask-aware mean pooling.
//
// Loads paraphrase-multilingual-MiniLM-L12-v2 from safetensors and produces 384-dim
// sentence embeddings. Batches are padded to the longest member; pooling only counts
// real tokens, so padding never changes a text's vector.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};

use crate::config;
use crate::embeddings::provider::Embedder;

/// The embedding engine holds the loaded model and tokenizer.
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl EmbeddingEngine {
    /// Load the model from a local directory containing model.safetensors,
    /// tokenizer.json, and config.json.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let config_path = model_dir.join(config::embedding::CONFIG_FILE);
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        log::info!(
            "Loading embedding model {}: hidden_size={}, layers={}, heads={}",
            config::embedding::EMBEDDING_MODEL_NAME,
            bert_config.hidden_size,
            bert_config.num_hidden_layers,
            bert_config.num_attention_heads,
        );

        if bert_config.hidden_size != config::embedding::EMBEDDING_DIMS {
            bail!(
                "model hidden_size {} does not match expected embedding dims {}",
                bert_config.hidden_size,
                config::embedding::EMBEDDING_DIMS
            );
        }

        let weights_path = model_dir.join(config::embedding::WEIGHTS_FILE);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };
        let model = BertModel::load(vb, &bert_config).context("load BERT model")?;

        let tokenizer_path = model_dir.join(config::embedding::TOKENIZER_FILE);
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        // Keep the tokenizer's own pad token/id; only switch to batch-longest.
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config::embedding::MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("configure truncation: {e}"))?;

        log::info!("Embedding model loaded successfully (dims={})", bert_config.hidden_size);

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn forward_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if seq_len == 0 {
            return Ok(vec![vec![0.0; config::embedding::EMBEDDING_DIMS]; batch]);
        }

        let mut ids: Vec<i64> = Vec::with_capacity(batch * seq_len);
        let mut mask: Vec<i64> = Vec::with_capacity(batch * seq_len);
        for enc in &encodings {
            let (e_ids, e_mask) = (enc.get_ids(), enc.get_attention_mask());
            for i in 0..seq_len {
                ids.push(e_ids.get(i).copied().unwrap_or(0) as i64);
                mask.push(e_mask.get(i).copied().unwrap_or(0) as i64);
            }
        }

        // [batch, seq_len]
        let token_ids_t = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let attention_mask_t = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;
        let token_type_ids = token_ids_t.zeros_like()?;

        // Forward pass → [batch, seq_len, hidden_size]
        let output = self
            .model
            .forward(&token_ids_t, &token_type_ids, Some(&attention_mask_t))?;

        let pooled = mean_pooling(&output, &attention_mask_t)?;
        let normalized = l2_normalize(&pooled)?;

        let vectors: Vec<Vec<f32>> = normalized.to_vec2()?;
        if let Some(v) = vectors.iter().find(|v| v.len() != config::embedding::EMBEDDING_DIMS) {
            bail!(
                "unexpected embedding dims: got {}, expected {}",
                v.len(),
                config::embedding::EMBEDDING_DIMS
            );
        }
        Ok(vectors)
    }
}

impl Embedder for EmbeddingEngine {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop().context("empty embedding batch")
    }

    /// Blank texts get the zero vector; the rest go through one padded forward pass.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = vec![vec![0.0; config::embedding::EMBEDDING_DIMS]; texts.len()];

        let (slots, inputs): (Vec<usize>, Vec<&str>) = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .unzip();
        if inputs.is_empty() {
            return Ok(out);
        }

        log::debug!("Embedding batch of {} texts", inputs.len());
        let vectors = self.forward_batch(&inputs)?;
        for (slot, v) in slots.into_iter().zip(vectors) {
            out[slot] = v;
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        config::embedding::EMBEDDING_DIMS
    }
}

/// Attention-mask-aware mean pooling.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let mask_expanded = attention_mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(input_embeds.shape())?;

    let sum_embeddings = (input_embeds * &mask_expanded)?.sum(1)?;

    // Clamp to avoid div by zero on all-padding rows.
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(1e-12, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}
