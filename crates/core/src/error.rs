use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported generation provider: {0}")]
    UnsupportedProvider(String),

    #[error("generation backend {backend} failed: {details}")]
    GenerationBackend { backend: String, details: String },

    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("vector store rejected request: {0}")]
    Store(String),
}

impl RagError {
    pub(crate) fn backend(backend: &str, details: impl Into<String>) -> Self {
        Self::GenerationBackend {
            backend: backend.to_string(),
            details: details.into(),
        }
    }

    pub(crate) fn missing_variable(variable: &str) -> Self {
        Self::Configuration(format!("environment variable {variable} is not set"))
    }
}

impl From<tokio_postgres::Error> for RagError {
    fn from(error: tokio_postgres::Error) -> Self {
        if error.is_closed() {
            Self::StoreUnavailable(error.to_string())
        } else {
            Self::Store(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid boundary pattern: {0}")]
    BoundaryPattern(#[from] regex::Error),

    #[error("no documents found in {0}")]
    NoDocuments(String),

    #[error(transparent)]
    Pipeline(#[from] RagError),
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
