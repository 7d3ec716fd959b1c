use crate::error::RagError;
use crate::models::{Chunk, DistanceMetric, IndexKind, RetrievalResult};
use async_trait::async_trait;

/// Durable storage of embedded chunks with nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn dimensions(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    /// Creates the table, extension and anything else search relies on.
    /// Safe to call on every startup.
    async fn ensure_schema(&self) -> Result<(), RagError>;

    /// Appends a new item and commits it on its own; returns its id.
    async fn insert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<i64, RagError>;

    async fn build_index(&self, kind: IndexKind) -> Result<(), RagError>;

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult, RagError>;

    async fn count(&self) -> Result<u64, RagError>;
}

pub(crate) fn check_dimensions(expected: usize, actual: usize) -> Result<(), RagError> {
    if expected != actual {
        return Err(RagError::InvalidArgument(format!(
            "embedding dimension {actual} does not match store dimension {expected}"
        )));
    }
    Ok(())
}
