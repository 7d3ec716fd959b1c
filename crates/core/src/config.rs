use crate::chunking::DEFAULT_MAX_CHUNK_LENGTH;
use crate::embeddings::DEFAULT_EMBEDDING_MODEL;
use crate::models::{DistanceMetric, IndexKind};
use crate::stores::postgres::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OLLAMA_HOST: &str = "OLLAMA_HOST";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_chunk_length: usize,
    pub top_k: usize,
    pub embedding_model_name: String,
    pub generation_provider: String,
    pub generation_model_name: String,
    pub distance_metric: DistanceMetric,
    /// `None` lets the store size decide.
    pub index_kind: Option<IndexKind>,
    pub request_timeout_secs: u64,
    pub table_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            top_k: 5,
            embedding_model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_provider: "local".to_string(),
            generation_model_name: "llama3".to_string(),
            distance_metric: DistanceMetric::L2,
            index_kind: None,
            request_timeout_secs: 60,
            table_name: DEFAULT_TABLE.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Looks up secrets by variable name when a call needs them.
pub trait CredentialSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl CredentialSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_chunk_length, 1_000);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.distance_metric, DistanceMetric::L2);
        assert_eq!(config.table_name, "items");
    }

    #[test]
    fn partial_config_fills_in_defaults() -> Result<(), serde_json::Error> {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"top_k": 3, "distance_metric": "cosine"}"#)?;
        assert_eq!(config.top_k, 3);
        assert_eq!(config.distance_metric, DistanceMetric::Cosine);
        assert_eq!(config.max_chunk_length, 1_000);
        Ok(())
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let mut secrets = HashMap::new();
        secrets.insert(GEMINI_API_KEY.to_string(), "  ".to_string());
        secrets.insert(OPENAI_API_KEY.to_string(), "sk-test".to_string());
        assert_eq!(CredentialSource::get(&secrets, GEMINI_API_KEY), None);
        assert_eq!(
            CredentialSource::get(&secrets, OPENAI_API_KEY).as_deref(),
            Some("sk-test")
        );
    }
}
