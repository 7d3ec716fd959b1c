use crate::error::RagError;
use crate::models::EmbeddingVector;

#[cfg(feature = "fastembed")]
pub use local_model::FastEmbedder;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const HASHING_MODEL_NAME: &str = "trigram-hash";

/// Maps text to fixed-length vectors. Implementations are stateless
/// between calls and deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, RagError>;

    fn embed_one(&self, text: &str) -> Result<EmbeddingVector, RagError> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::ModelUnavailable("model returned no vector".to_string()))
    }
}

/// Character trigram feature hashing. Needs no model runtime.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// Scales to unit length; the zero vector is left as is.
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
}

impl HashingEmbedder {
    /// Buckets every character trigram of the lowercased text, padded with
    /// a space on each side so word edges contribute their own features.
    fn vectorize(&self, text: &str) -> EmbeddingVector {
        let buckets = self.dimensions();
        let mut vector = vec![0f32; buckets];
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vector;
        }

        let padded = format!(" {} ", trimmed.to_lowercase());
        let offsets: Vec<usize> = padded
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(padded.len()))
            .collect();

        for window in offsets.windows(4) {
            let trigram = &padded.as_bytes()[window[0]..window[3]];
            let bucket = fnv1a(trigram) % buckets as u64;
            vector[bucket as usize] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, RagError> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

#[cfg(feature = "fastembed")]
mod local_model {
    use super::{Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
    use crate::error::RagError;
    use crate::models::EmbeddingVector;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use tracing::{info, warn};

    /// Sentence-transformer model run through ONNX Runtime. The model is
    /// loaded on first use and kept for the life of the process; a failed
    /// load is remembered and reported on every later call.
    pub struct FastEmbedder {
        name: String,
        model: EmbeddingModel,
        cache_dir: Option<PathBuf>,
        loaded: OnceLock<Result<Mutex<TextEmbedding>, String>>,
    }

    impl FastEmbedder {
        pub fn new(model_name: &str) -> Result<Self, RagError> {
            let model = match model_name {
                "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                    EmbeddingModel::AllMiniLML6V2
                }
                "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                    EmbeddingModel::AllMiniLML12V2
                }
                "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                other => {
                    return Err(RagError::Configuration(format!(
                        "unknown embedding model: {other}"
                    )))
                }
            };

            Ok(Self {
                name: model_name.to_string(),
                model,
                cache_dir: None,
                loaded: OnceLock::new(),
            })
        }

        pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
            self.cache_dir = Some(cache_dir.into());
            self
        }

        fn model(&self) -> Result<&Mutex<TextEmbedding>, RagError> {
            let loaded = self.loaded.get_or_init(|| {
                let mut options = InitOptions::new(self.model.clone());
                if let Some(dir) = &self.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }
                match TextEmbedding::try_new(options) {
                    Ok(model) => {
                        info!(model = %self.name, "embedding model loaded");
                        Ok(Mutex::new(model))
                    }
                    Err(error) => {
                        warn!(model = %self.name, %error, "embedding model failed to load");
                        Err(error.to_string())
                    }
                }
            });

            loaded
                .as_ref()
                .map_err(|reason| RagError::ModelUnavailable(format!("{}: {reason}", self.name)))
        }
    }

    impl Embedder for FastEmbedder {
        fn dimensions(&self) -> usize {
            DEFAULT_EMBEDDING_DIMENSIONS
        }

        fn model_name(&self) -> &str {
            &self.name
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, RagError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let mut model = self
                .model()?
                .lock()
                .map_err(|_| RagError::ModelUnavailable(format!("{} lock poisoned", self.name)))?;

            model
                .embed(texts.to_vec(), None)
                .map_err(|error| RagError::ModelUnavailable(error.to_string()))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashingEmbedder};

    #[test]
    fn same_text_embeds_identically() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed_one("Febrile infant pathway").unwrap();
        let second = embedder.embed_one("Febrile infant pathway").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn vector_length_follows_configured_dimensions() {
        let embedder = HashingEmbedder { dimensions: 32 };
        let vector = embedder.embed_one("abc").unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn empty_batch_yields_no_vectors() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed(&[]).unwrap().is_empty());
    }

    #[test]
    fn vectors_have_unit_length_and_blank_text_is_zero() {
        let embedder = HashingEmbedder::default();
        let vector = embedder.embed_one("Wheeze with hypoxia").unwrap();
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let blank = embedder.embed_one("   ").unwrap();
        assert!(blank.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn batch_matches_single_and_keeps_order() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["asthma".to_string(), "sepsis".to_string()];
        let batch = embedder.embed(&texts).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed_one("asthma").unwrap());
        assert_eq!(batch[1], embedder.embed_one("sepsis").unwrap());
    }

    #[test]
    fn different_text_gives_different_vectors() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_one("bronchiolitis").unwrap();
        let b = embedder.embed_one("appendicitis").unwrap();
        assert_ne!(a, b);
    }
}
