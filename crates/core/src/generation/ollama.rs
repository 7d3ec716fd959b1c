use super::{endpoint, http_client, parse_base_url, send_json, GenerationBackend};
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";

/// Model served by a local Ollama daemon. Needs no credentials.
pub struct OllamaBackend {
    client: Client,
    base_url: Url,
}

impl OllamaBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RagError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn generate(&self, prompt: &str, model_name: &str) -> Result<String, RagError> {
        let url = endpoint(&self.base_url, "api/chat", self.name())?;
        let request = self.client.post(url).json(&json!({
            "model": model_name,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        }));

        let parsed = send_json(request, self.name()).await?;
        parsed
            .pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RagError::backend(self.name(), "response missing message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_server::{serve_once, serve_silently};

    #[tokio::test]
    async fn chat_reply_is_extracted() -> Result<(), RagError> {
        let (url, server) = serve_once(
            200,
            r#"{"model":"llama3","message":{"role":"assistant","content":"Start IV fluids."},"done":true}"#,
        )
        .await;
        let backend = OllamaBackend::new(&url, Duration::from_secs(5))?;

        let answer = backend.generate("prompt text", "llama3").await?;
        assert_eq!(answer, "Start IV fluids.");

        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /api/chat"));
        assert!(request.contains(r#""stream":false"#));
        assert!(request.contains("prompt text"));
        Ok(())
    }

    #[tokio::test]
    async fn error_status_becomes_backend_error() -> Result<(), RagError> {
        let (url, _server) = serve_once(404, r#"{"error":"model 'nope' not found"}"#).await;
        let backend = OllamaBackend::new(&url, Duration::from_secs(5))?;

        let result = backend.generate("p", "nope").await;
        match result {
            Err(RagError::GenerationBackend { backend, details }) => {
                assert_eq!(backend, "ollama");
                assert!(details.contains("not found"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn slow_daemon_times_out() -> Result<(), RagError> {
        let (url, _server) = serve_silently().await;
        let backend = OllamaBackend::new(&url, Duration::from_millis(200))?;

        let result = backend.generate("p", "llama3").await;
        assert!(matches!(
            result,
            Err(RagError::GenerationBackend { details, .. }) if details.contains("timed out")
        ));
        Ok(())
    }
}
