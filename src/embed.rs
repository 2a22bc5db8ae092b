//! Text-to-vector embedders.
//!
//! The retrieval service receives an embedder as an explicit `Arc<dyn Embedder>` at
//! construction time; the same instance is reused read-only for every ingest and query.

use crate::config::Number;
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::Vector;
use crate::vector_ops::normalize_vector;
use sha2::{Digest, Sha256};

/// Model names the `fastembed` embedder accepts, in their canonical spelling.
pub const FASTEMBED_MODELS: &[&str] = &[
    "all-MiniLM-L6-v2",
    "all-MiniLM-L12-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
];

/// Canonical spelling of a supported fastembed model name, matched case-insensitively.
pub fn fastembed_model_name(name: &str) -> Option<&'static str> {
    FASTEMBED_MODELS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

pub trait Embedder: Send + Sync {
    /// Identity of the underlying model, recorded in every artifact.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    fn embed(&self, texts: &[&str]) -> RetrievalResult<Vec<Vector>>;

    fn embed_one(&self, text: &str) -> RetrievalResult<Vector> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Tokens are lower-cased alphanumeric runs. Each token's SHA-256 digest picks a bucket
/// and a sign; the resulting count vector is L2-normalised. Texts sharing vocabulary end
/// up close together, which is all a lexical fallback needs to provide.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: Self::model_id_for(dimension),
        }
    }

    pub fn model_id_for(dimension: usize) -> String {
        format!("hashing-sha256-{dimension}")
    }

    fn embed_text(&self, text: &str) -> Vector {
        let mut vector = vec![0.0 as Number; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_vector(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> RetrievalResult<Vec<Vector>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(feature = "fastembed")]
pub use self::fast::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fast {
    use super::{fastembed_model_name, Embedder};
    use crate::error::{RetrievalError, RetrievalResult};
    use crate::index::Vector;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;
    use tracing::info;

    /// ONNX sentence-transformer embeddings via fastembed (`all-MiniLM-L6-v2` by default).
    pub struct FastEmbedder {
        /// `TextEmbedding::embed` takes `&mut self`
        model: Mutex<TextEmbedding>,
        model_id: String,
        dimension: usize,
    }

    impl FastEmbedder {
        pub fn new() -> RetrievalResult<Self> {
            Self::with_model(EmbeddingModel::AllMiniLML6V2, "all-MiniLM-L6-v2")
        }

        /// Load one of [`super::FASTEMBED_MODELS`] by name.
        pub fn from_name(name: &str) -> RetrievalResult<Self> {
            let canonical = fastembed_model_name(name).ok_or_else(|| {
                RetrievalError::Embedding(format!("unsupported fastembed model '{name}'"))
            })?;
            let model = match canonical {
                "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
                "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLML12V2,
                "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
                other => {
                    return Err(RetrievalError::Embedding(format!(
                        "no fastembed mapping for '{other}'"
                    )))
                }
            };
            Self::with_model(model, canonical)
        }

        pub fn with_model(model: EmbeddingModel, model_id: &str) -> RetrievalResult<Self> {
            let mut text_model = TextEmbedding::try_new(
                InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(|e| RetrievalError::Embedding(format!("failed to initialise model: {e}")))?;

            // The model reports its width only through an embedding
            let sample = text_model
                .embed(vec!["dimension check"], None)
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
            let dimension = sample
                .first()
                .map(Vec::len)
                .ok_or_else(|| RetrievalError::Embedding("model returned no sample vector".to_string()))?;

            info!(target: "ragify::embed", "loaded {model_id} ({dimension} dimensions)");

            Ok(Self {
                model: Mutex::new(text_model),
                model_id: model_id.to_string(),
                dimension,
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, texts: &[&str]) -> RetrievalResult<Vec<Vector>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| RetrievalError::Embedding("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| RetrievalError::Embedding(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_ops::squared_l2_scalar;

    #[test]
    fn hashing_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_one("Paging and Segmentation").unwrap();
        let b = embedder.embed_one("paging AND segmentation!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: Number = a.iter().map(|x| x * x).sum::<Number>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(512);
        let vectors = embedder
            .embed(&["virtual memory paging", "memory paging", "tcp congestion window"])
            .unwrap();
        let near = squared_l2_scalar(&vectors[0], &vectors[1]);
        let far = squared_l2_scalar(&vectors[0], &vectors[2]);
        assert!(near < far, "{near} >= {far}");
    }

    #[test]
    fn text_without_tokens_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed_one("  -- !! ").unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn output_count_matches_input() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed(&[]).unwrap().is_empty());
        assert_eq!(embedder.embed(&["a", "b", "c"]).unwrap().len(), 3);
        assert_eq!(embedder.model_id(), "hashing-sha256-16");
    }

    #[test]
    fn fastembed_names_resolve_to_canonical_spelling() {
        assert_eq!(fastembed_model_name("ALL-minilm-l6-v2"), Some("all-MiniLM-L6-v2"));
        assert_eq!(fastembed_model_name("bge-base-en-v1.5"), Some("bge-base-en-v1.5"));
        assert_eq!(fastembed_model_name("all-MiniLM-L6"), None);
    }
}
