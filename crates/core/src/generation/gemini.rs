use super::{endpoint, http_client, parse_base_url, send_json, GenerationBackend};
use crate::config::{CredentialSource, GEMINI_API_KEY};
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const KNOWN_MODELS: &[&str] = &["gemini-pro", "gemini-1.5-pro", "gemini-1.5-flash"];

pub struct GeminiBackend {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl GeminiBackend {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, RagError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
            credentials,
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn known_models(&self) -> &[&'static str] {
        KNOWN_MODELS
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn generate(&self, prompt: &str, model_name: &str) -> Result<String, RagError> {
        let api_key = self
            .credentials
            .get(GEMINI_API_KEY)
            .ok_or_else(|| RagError::missing_variable(GEMINI_API_KEY))?;

        let url = endpoint(
            &self.base_url,
            &format!("models/{model_name}:generateContent"),
            self.name(),
        )?;
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key.trim())
            .json(&json!({
                "contents": [{"role": "user", "parts": [{"text": prompt}]}],
                "generationConfig": {"temperature": 0.0},
            }));

        let parsed = send_json(request, self.name()).await?;
        let answer = parsed
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(RagError::backend(self.name(), "response missing candidate text"));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_server::serve_once;
    use std::collections::HashMap;

    fn credentials(key: Option<&str>) -> Arc<dyn CredentialSource> {
        let mut secrets = HashMap::new();
        if let Some(key) = key {
            secrets.insert(GEMINI_API_KEY.to_string(), key.to_string());
        }
        Arc::new(secrets)
    }

    #[tokio::test]
    async fn missing_key_fails_only_the_call() -> Result<(), RagError> {
        let backend = GeminiBackend::new(
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            credentials(None),
        )?;

        let result = backend.generate("p", DEFAULT_MODEL).await;
        assert!(
            matches!(result, Err(RagError::Configuration(msg)) if msg.contains(GEMINI_API_KEY))
        );
        Ok(())
    }

    #[tokio::test]
    async fn candidate_parts_are_joined() -> Result<(), RagError> {
        let (url, server) = serve_once(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Use the "},{"text":"PECARN rule."}]}}]}"#,
        )
        .await;
        let backend = GeminiBackend::new(&url, Duration::from_secs(5), credentials(Some("g-key")))?;

        let answer = backend.generate("prompt", "gemini-1.5-pro").await?;
        assert_eq!(answer, "Use the PECARN rule.");

        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /models/gemini-1.5-pro:generateContent"));
        assert!(request.to_lowercase().contains("x-goog-api-key: g-key"));
        Ok(())
    }

    #[tokio::test]
    async fn blocked_response_without_text_is_an_error() -> Result<(), RagError> {
        let (url, _server) =
            serve_once(200, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).await;
        let backend = GeminiBackend::new(&url, Duration::from_secs(5), credentials(Some("g-key")))?;

        let result = backend.generate("prompt", DEFAULT_MODEL).await;
        assert!(matches!(result, Err(RagError::GenerationBackend { .. })));
        Ok(())
    }
}
