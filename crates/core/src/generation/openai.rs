use super::{endpoint, http_client, parse_base_url, send_json, GenerationBackend};
use crate::config::{CredentialSource, OPENAI_API_KEY};
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const KNOWN_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-4o-mini",
];

pub struct OpenAiBackend {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl OpenAiBackend {
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
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
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
            .get(OPENAI_API_KEY)
            .ok_or_else(|| RagError::missing_variable(OPENAI_API_KEY))?;

        let url = endpoint(&self.base_url, "chat/completions", self.name())?;
        let request = self
            .client
            .post(url)
            .bearer_auth(api_key.trim())
            .json(&json!({
                "model": model_name,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0,
            }));

        let parsed = send_json(request, self.name()).await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RagError::backend(self.name(), "response missing message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_server::serve_once;
    use std::collections::HashMap;

    fn credentials() -> Arc<dyn CredentialSource> {
        let mut secrets = HashMap::new();
        secrets.insert(OPENAI_API_KEY.to_string(), "sk-test".to_string());
        Arc::new(secrets)
    }

    #[tokio::test]
    async fn completion_content_is_returned() -> Result<(), RagError> {
        let (url, server) = serve_once(
            200,
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Admit if SpO2 < 90%."}}]}"#,
        )
        .await;
        let backend = OpenAiBackend::new(&url, Duration::from_secs(5), credentials())?;

        let answer = backend.generate("prompt", "gpt-4o").await?;
        assert_eq!(answer, "Admit if SpO2 < 90%.");

        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""model":"gpt-4o""#));
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_is_surfaced() -> Result<(), RagError> {
        let (url, _server) = serve_once(429, r#"{"error":{"message":"Rate limit reached"}}"#).await;
        let backend = OpenAiBackend::new(&url, Duration::from_secs(5), credentials())?;

        let result = backend.generate("prompt", DEFAULT_MODEL).await;
        assert!(matches!(
            result,
            Err(RagError::GenerationBackend { details, .. }) if details.contains("429")
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_names_the_variable() -> Result<(), RagError> {
        let backend = OpenAiBackend::new(
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            Arc::new(HashMap::<String, String>::new()),
        )?;
        let result = backend.generate("prompt", DEFAULT_MODEL).await;
        assert!(
            matches!(result, Err(RagError::Configuration(msg)) if msg.contains(OPENAI_API_KEY))
        );
        Ok(())
    }
}
