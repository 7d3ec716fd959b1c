use crate::chunking::Chunker;
use crate::embeddings::Embedder;
use crate::error::{IngestError, RagError};
use crate::models::{Document, DocumentFingerprint};
use crate::traits::VectorStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if is_text {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn load_document(path: &Path) -> Result<Document, IngestError> {
    let source_id = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let text = tokio::fs::read_to_string(path).await?;
    Ok(Document { source_id, text })
}

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks_inserted: usize,
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub source_id: String,
    pub reason: String,
    /// Chunks committed before the failure.
    pub chunks_inserted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents: Vec<IngestedDocument>,
    pub skipped: Vec<SkippedDocument>,
}

impl IngestionReport {
    pub fn chunks_inserted(&self) -> usize {
        self.documents
            .iter()
            .map(|doc| doc.chunks_inserted)
            .chain(self.skipped.iter().map(|doc| doc.chunks_inserted))
            .sum()
    }
}

/// Chunk, embed and store documents one at a time.
pub struct Ingestor<S>
where
    S: VectorStore,
{
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<S>,
}

impl<S> Ingestor<S>
where
    S: VectorStore,
{
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: Arc<S>) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Inserts are committed one by one, so a failure part-way leaves the
    /// earlier chunks of the document stored.
    pub async fn ingest_document(
        &self,
        document: &Document,
        source_path: &str,
    ) -> Result<IngestedDocument, (IngestError, usize)> {
        let fingerprint = DocumentFingerprint {
            source_id: document.source_id.clone(),
            source_path: source_path.to_string(),
            checksum: digest_text(&document.text),
            ingested_at: Utc::now(),
        };

        let chunks = self.chunker.chunk(&document.source_id, &document.text);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .map_err(|error| (IngestError::from(error), 0))?;
        if embeddings.len() != chunks.len() {
            let error = RagError::ModelUnavailable(format!(
                "{} returned {} vectors for {} chunks",
                self.embedder.model_name(),
                embeddings.len(),
                chunks.len()
            ));
            return Err((IngestError::from(error), 0));
        }

        let mut inserted = 0usize;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            self.store
                .insert(chunk, embedding)
                .await
                .map_err(|error| (IngestError::from(error), inserted))?;
            inserted += 1;
        }

        info!(
            source = %document.source_id,
            checksum = %fingerprint.checksum,
            chunks = inserted,
            "document ingested"
        );

        Ok(IngestedDocument {
            fingerprint,
            chunks_inserted: inserted,
        })
    }

    /// A failing document is logged and reported; the batch carries on.
    pub async fn ingest_documents(&self, documents: &[Document]) -> IngestionReport {
        let mut report = IngestionReport::default();
        for document in documents {
            self.record(&mut report, document, &document.source_id).await;
        }
        report
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_documents(folder);
        if files.is_empty() {
            return Err(IngestError::NoDocuments(folder.display().to_string()));
        }

        let mut report = IngestionReport::default();
        for path in files {
            let source_path = path.to_string_lossy().to_string();
            match load_document(&path).await {
                Ok(document) => self.record(&mut report, &document, &source_path).await,
                Err(error) => {
                    warn!(path = %source_path, reason = %error, "skipped document");
                    report.skipped.push(SkippedDocument {
                        source_id: source_path,
                        reason: error.to_string(),
                        chunks_inserted: 0,
                    });
                }
            }
        }
        Ok(report)
    }

    async fn record(&self, report: &mut IngestionReport, document: &Document, source_path: &str) {
        match self.ingest_document(document, source_path).await {
            Ok(ingested) => report.documents.push(ingested),
            Err((error, inserted)) => {
                warn!(source = %document.source_id, reason = %error, inserted, "skipped document");
                report.skipped.push(SkippedDocument {
                    source_id: document.source_id.clone(),
                    reason: error.to_string(),
                    chunks_inserted: inserted,
                });
            }
        }
    }
}
