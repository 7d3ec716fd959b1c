pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chunking::{chunk, BoundaryPredicate, Chunker, MarkdownHeading, RegexBoundary};
#[cfg(feature = "fastembed")]
pub use embeddings::FastEmbedder;
pub use embeddings::{
    Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
    HASHING_MODEL_NAME,
};
pub use config::{CredentialSource, EnvCredentials, PipelineConfig};
pub use error::{IngestError, RagError};
pub use generation::{
    build_prompt, GeminiBackend, GenerationBackend, GenerationDispatcher, OllamaBackend,
    OpenAiBackend, NO_CONTEXT_ANSWER,
};
pub use ingest::{discover_documents, IngestedDocument, IngestionReport, Ingestor, SkippedDocument};
pub use models::{
    Chunk, ContextChunk, DistanceMetric, Document, DocumentFingerprint, EmbeddingVector,
    GeneratedAnswer, GenerationRequest, IndexKind, ProviderKind, RetrievalResult, ScoredItem,
    StoredItem,
};
pub use pipeline::RagPipeline;
pub use retriever::Retriever;
pub use stores::{MemoryStore, PgVectorStore};
pub use traits::VectorStore;
