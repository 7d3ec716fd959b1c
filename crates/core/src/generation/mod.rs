//! Prompt assembly and routing to interchangeable generation backends.

pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::{CredentialSource, PipelineConfig, OLLAMA_HOST};
use crate::error::RagError;
use crate::models::{
    ContextChunk, GeneratedAnswer, GenerationRequest, ProviderKind, RetrievalResult,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const NO_CONTEXT_ANSWER: &str = "No relevant clinical pathways found to answer your query.";

/// Turns a prompt into text for one provider.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Model names the backend accepts. Empty means any name is passed through.
    fn known_models(&self) -> &[&'static str] {
        &[]
    }

    fn default_model(&self) -> &str;

    async fn generate(&self, prompt: &str, model_name: &str) -> Result<String, RagError>;
}

#[derive(Default)]
pub struct GenerationDispatcher {
    backends: HashMap<ProviderKind, Arc<dyn GenerationBackend>>,
}

impl GenerationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(
        mut self,
        kind: ProviderKind,
        backend: impl GenerationBackend + 'static,
    ) -> Self {
        self.backends.insert(kind, Arc::new(backend));
        self
    }

    /// Registers the local Ollama backend and both remote backends. Remote
    /// keys are looked up through `credentials` on each call.
    pub fn from_config(
        config: &PipelineConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, RagError> {
        let timeout = config.request_timeout();
        let ollama_url = credentials
            .get(OLLAMA_HOST)
            .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string());

        Ok(Self::new()
            .with_backend(ProviderKind::Local, OllamaBackend::new(&ollama_url, timeout)?)
            .with_backend(
                ProviderKind::Gemini,
                GeminiBackend::new(gemini::DEFAULT_BASE_URL, timeout, credentials.clone())?,
            )
            .with_backend(
                ProviderKind::OpenAi,
                OpenAiBackend::new(openai::DEFAULT_BASE_URL, timeout, credentials)?,
            ))
    }

    pub async fn answer(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
        provider: &str,
        model_name: &str,
    ) -> Result<String, RagError> {
        Ok(self
            .answer_detailed(query, retrieval, provider, model_name)
            .await?
            .text)
    }

    /// Empty retrieval short-circuits before the provider is even parsed,
    /// so no backend is ever asked to answer without context.
    pub async fn answer_detailed(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
        provider: &str,
        model_name: &str,
    ) -> Result<GeneratedAnswer, RagError> {
        if retrieval.is_empty() {
            debug!(query, "no context retrieved, skipping generation");
            return Ok(GeneratedAnswer {
                text: NO_CONTEXT_ANSWER.to_string(),
                provider: None,
                model_name: None,
                model_substituted: false,
                sources: Vec::new(),
            });
        }

        let request = GenerationRequest {
            query: query.to_string(),
            context_chunks: retrieval.context_chunks(),
            provider: provider.parse()?,
            model_name: model_name.to_string(),
        };
        self.generate(&request).await
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAnswer, RagError> {
        if request.context_chunks.is_empty() {
            return Ok(GeneratedAnswer {
                text: NO_CONTEXT_ANSWER.to_string(),
                provider: Some(request.provider),
                model_name: None,
                model_substituted: false,
                sources: Vec::new(),
            });
        }

        let backend = self
            .backends
            .get(&request.provider)
            .ok_or_else(|| RagError::UnsupportedProvider(request.provider.to_string()))?;

        let (model_name, model_substituted) = resolve_model(backend.as_ref(), &request.model_name);
        if model_substituted {
            warn!(
                provider = %request.provider,
                requested = %request.model_name,
                substituted = %model_name,
                "unknown model for provider, using default"
            );
        }

        let prompt = build_prompt(&request.query, &request.context_chunks);
        let text = backend.generate(&prompt, &model_name).await?;

        let mut sources: Vec<String> = Vec::new();
        for chunk in &request.context_chunks {
            if !sources.contains(&chunk.source_id) {
                sources.push(chunk.source_id.clone());
            }
        }

        Ok(GeneratedAnswer {
            text,
            provider: Some(request.provider),
            model_name: Some(model_name),
            model_substituted,
            sources,
        })
    }
}

fn resolve_model(backend: &dyn GenerationBackend, requested: &str) -> (String, bool) {
    let known = backend.known_models();
    let requested = requested.trim();

    if requested.is_empty() {
        return (backend.default_model().to_string(), !known.is_empty());
    }
    if known.is_empty() || known.iter().any(|model| *model == requested) {
        return (requested.to_string(), false);
    }
    (backend.default_model().to_string(), true)
}

pub fn build_prompt(query: &str, chunks: &[ContextChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| format!("Source ({}): {}", chunk.source_id, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = String::new();
    prompt.push_str(
        "You are a clinical assistant. Answer the question strictly from the context below.\n",
    );
    prompt.push_str("If the answer is not in the context, say that you do not know.\n\n");
    prompt.push_str("Context:\n");
    prompt.push_str(&context);
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(query.trim());
    prompt.push_str("\n\nAnswer:\n");
    prompt
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, RagError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| RagError::Configuration(format!("failed to build http client: {error}")))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, RagError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|error| RagError::Configuration(format!("invalid base url {raw}: {error}")))
}

pub(crate) fn endpoint(base: &Url, path: &str, backend: &str) -> Result<Url, RagError> {
    base.join(path)
        .map_err(|error| RagError::backend(backend, format!("invalid endpoint {path}: {error}")))
}

pub(crate) async fn send_json(request: RequestBuilder, backend: &str) -> Result<Value, RagError> {
    let response = request
        .send()
        .await
        .map_err(|error| transport_error(backend, error))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(RagError::backend(backend, format!("{status}: {body}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|error| transport_error(backend, error))
}

fn transport_error(backend: &str, error: reqwest::Error) -> RagError {
    if error.is_timeout() {
        RagError::backend(backend, format!("request timed out: {error}"))
    } else {
        RagError::backend(backend, error.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Serves one canned response and hands back the raw request.
    pub(crate) async fn serve_once(
        status: u16,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write response");
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}/"), handle)
    }

    /// Accepts a connection and never answers.
    pub(crate) async fn serve_silently() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            if let Ok((_socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
        (format!("http://{addr}/"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.expect("read request");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).to_string()
    }
}
