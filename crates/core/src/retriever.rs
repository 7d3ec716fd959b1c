use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::models::RetrievalResult;
use crate::traits::VectorStore;
use std::sync::Arc;
use tracing::debug;

pub struct Retriever<S>
where
    S: VectorStore,
{
    embedder: Arc<dyn Embedder>,
    store: Arc<S>,
}

impl<S> Retriever<S>
where
    S: VectorStore,
{
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<S>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// An empty store yields an empty result, never an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RagError> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be a positive integer".to_string()));
        }

        let query_vector = self.embedder.embed_one(query)?;
        let result = self.store.search(&query_vector, k).await?;
        debug!(k, hits = result.len(), "retrieved context");
        Ok(result)
    }
}
