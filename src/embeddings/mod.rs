// embeddings/ — Local sentence embedding provider using candle (pure Rust).
//
// Provides:
// - The `Embedder` seam and cosine similarity
// - Model download + SHA256 reporting
// - BERT inference with mean pooling

pub mod download;
pub mod engine;
pub mod provider;

pub use provider::{cosine_similarity, Embedder, SharedEmbedder};
