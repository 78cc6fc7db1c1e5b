//! Text embedders used by the vector index.
//!
//! The index only depends on [`Embedder`]; the same implementation (checked
//! by name and dimension) must be used at build time and at query time.

use crate::classifier::vectorizer::tokenize;
use crate::config::{EmbedderKind, RetrievalConfig};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Maps texts to fixed-width dense vectors.
pub trait Embedder: Send + Sync {
    /// Stable identifier persisted with the index.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector of length [`dimension`](Self::dimension) per input text.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder selected in config.
pub fn create_embedder(config: &RetrievalConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "embedding-local")]
        EmbedderKind::Fastembed => {
            let embedder = local::FastEmbedder::new()?;
            if embedder.dimension() != config.dimension {
                return Err(Error::Config(format!(
                    "retrieval.dimension is {} but the local model produces {}",
                    config.dimension,
                    embedder.dimension()
                )));
            }
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "embedding-local"))]
        EmbedderKind::Fastembed => Err(Error::Config(
            "retrieval.embedder = \"fastembed\" requires the `embedding-local` feature".into(),
        )),
    }
}

// ── Hashing embedder ─────────────────────────────────────────────

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Signed feature hashing of lowercased unigrams and bigrams.
///
/// Deterministic and dependency-free: texts sharing words land near each
/// other in L2 distance, which is enough for a small knowledge base.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: "hashing-fnv1a".into(),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(&text.to_lowercase());
        let mut vector = vec![0.0_f32; self.dimension];

        let bigrams = tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1]));
        for term in tokens.iter().cloned().chain(bigrams) {
            let hash = fnv1a(term.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

// ── Local sentence model ─────────────────────────────────────────

#[cfg(feature = "embedding-local")]
mod local {
    use super::Embedder;
    use crate::error::{Error, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    const MINILM_DIMENSION: usize = 384;

    /// all-MiniLM-L6-v2 through ONNX Runtime. The model is downloaded on
    /// first use into the fastembed cache.
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self> {
            let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                .map_err(|e| Error::not_ready("embedding model", e.to_string()))?;
            tracing::info!(model = "all-MiniLM-L6-v2", "Local embedding model loaded");
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn name(&self) -> &str {
            "fastembed-all-minilm-l6-v2"
        }

        fn dimension(&self) -> usize {
            MINILM_DIMENSION
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let mut model = self.model.lock();
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| Error::Embedding(e.to_string()))
        }
    }
}

#[cfg(feature = "embedding-local")]
pub use local::FastEmbedder;
