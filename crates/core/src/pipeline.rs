use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::generation::GenerationDispatcher;
use crate::models::{GeneratedAnswer, IndexKind, RetrievalResult};
use crate::retriever::Retriever;
use crate::traits::VectorStore;
use std::sync::Arc;
use tracing::info;

/// Query path: embed, search, then generate from what was found.
pub struct RagPipeline<S>
where
    S: VectorStore,
{
    retriever: Retriever<S>,
    dispatcher: GenerationDispatcher,
    config: PipelineConfig,
}

impl<S> RagPipeline<S>
where
    S: VectorStore,
{
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<S>,
        dispatcher: GenerationDispatcher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, store),
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, RagError> {
        self.retriever.retrieve(query, self.config.top_k).await
    }

    pub async fn answer(&self, query: &str) -> Result<String, RagError> {
        Ok(self.answer_detailed(query).await?.text)
    }

    pub async fn answer_detailed(&self, query: &str) -> Result<GeneratedAnswer, RagError> {
        let retrieval = self.retrieve(query).await?;
        self.dispatcher
            .answer_detailed(
                query,
                &retrieval,
                &self.config.generation_provider,
                &self.config.generation_model_name,
            )
            .await
    }

    /// Builds the configured index, or picks one from the current store
    /// size when none is configured. Blocks concurrent searches on most
    /// stores while it runs.
    pub async fn build_index(&self) -> Result<IndexKind, RagError> {
        let store = self.retriever.store();
        let kind = match self.config.index_kind {
            Some(kind) => kind,
            None => IndexKind::recommended(store.count().await?),
        };
        store.build_index(kind).await?;
        info!(kind = ?kind, "index built");
        Ok(kind)
    }
}
