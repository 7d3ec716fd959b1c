use crate::error::RagError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EmbeddingVector = Vec<f32>;

/// Normalized text handed over by the format converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    pub sequence_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: i64,
    pub text: String,
    pub source_id: String,
    pub sequence_index: u64,
    pub embedding: EmbeddingVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: StoredItem,
    pub distance: f64,
}

/// Hits ordered by ascending distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredItem>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredItem>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredItem> {
        self.hits.iter()
    }

    pub fn context_chunks(&self) -> Vec<ContextChunk> {
        self.hits
            .iter()
            .map(|hit| ContextChunk {
                text: hit.item.text.clone(),
                source_id: hit.item.source_id.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub source_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Local,
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            _ => Err(RagError::UnsupportedProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    pub context_chunks: Vec<ContextChunk>,
    pub provider: ProviderKind,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub provider: Option<ProviderKind>,
    pub model_name: Option<String>,
    pub model_substituted: bool,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    L2,
    Cosine,
    InnerProduct,
}

impl DistanceMetric {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::L2 => "<->",
            Self::Cosine => "<=>",
            Self::InnerProduct => "<#>",
        }
    }

    pub fn operator_class(&self) -> &'static str {
        match self {
            Self::L2 => "vector_l2_ops",
            Self::Cosine => "vector_cosine_ops",
            Self::InnerProduct => "vector_ip_ops",
        }
    }

    /// Same values pgvector reports for the matching operator; inner
    /// product is negated so that smaller stays closer.
    pub fn distance(&self, left: &[f32], right: &[f32]) -> f64 {
        match self {
            Self::L2 => left
                .iter()
                .zip(right)
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum::<f64>()
                .sqrt(),
            Self::Cosine => {
                let dot = dot(left, right);
                let norms = dot_self(left).sqrt() * dot_self(right).sqrt();
                if norms == 0.0 {
                    1.0
                } else {
                    1.0 - dot / norms
                }
            }
            Self::InnerProduct => -dot(left, right),
        }
    }
}

fn dot(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum()
}

fn dot_self(values: &[f32]) -> f64 {
    dot(values, values)
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "ip" | "inner_product" => Ok(Self::InnerProduct),
            other => Err(RagError::Configuration(format!(
                "unknown distance metric: {other}"
            ))),
        }
    }
}

pub const APPROXIMATE_INDEX_THRESHOLD: u64 = 20_000;
pub const DEFAULT_IVFFLAT_LISTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Hnsw,
    IvfFlat { lists: u32 },
    Exact,
}

impl IndexKind {
    pub fn recommended(item_count: u64) -> Self {
        if item_count > APPROXIMATE_INDEX_THRESHOLD {
            Self::Hnsw
        } else {
            Self::Exact
        }
    }

    pub fn is_approximate(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

impl FromStr for IndexKind {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "hnsw" | "approx" => Ok(Self::Hnsw),
            "ivfflat" => Ok(Self::IvfFlat {
                lists: DEFAULT_IVFFLAT_LISTS,
            }),
            "exact" => Ok(Self::Exact),
            other => Err(RagError::InvalidArgument(format!(
                "unknown index kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub source_id: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}
