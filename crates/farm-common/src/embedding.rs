/// Embedding providers for query and document vectors.
///
/// The assistant only needs "text in, vector out". Providers are reached through the
/// `EmbeddingProvider` trait so the chat pipeline can run against the hosted inference API
/// in production and an in-process fake in tests.
///
/// The hosted backend is the Hugging Face feature-extraction endpoint serving
/// `sentence-transformers/all-MiniLM-L6-v2` (384 dimensions). That endpoint has answered
/// with three JSON shapes over time, all of which are accepted:
/// - nested: `[[0.1, 0.2, ...]]`
/// - flat: `[0.1, 0.2, ...]`
/// - wrapped: `{ "embeddings": [[0.1, ...]] }` or `{ "embeddings": [0.1, ...] }`
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CommonError;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";
const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_DIMENSIONS: usize = 384;
const PLACEHOLDER_KEY: &str = "your_huggingface_api_key_here";
const MIN_KEY_LEN: usize = 20;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError>;

    /// Embed several texts. The default calls [`embed`](EmbeddingProvider::embed) in order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CommonError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimensionality of the vectors this provider returns.
    fn dimensions(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct HuggingFaceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl HuggingFaceConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("HUGGINGFACE_API_KEY")
            .ok()
            .map(|k| k.trim().to_string());

        let base_url = std::env::var("HUGGINGFACE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model =
            std::env::var("HUGGINGFACE_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout = std::env::var("HUGGINGFACE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));

        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        }
    }

    /// Returns the key only when it looks usable: set, not the sample placeholder,
    /// and at least 20 characters.
    pub fn usable_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|k| *k != PLACEHOLDER_KEY && k.len() >= MIN_KEY_LEN)
    }
}

pub struct HuggingFaceEmbedder {
    config: HuggingFaceConfig,
    http: reqwest::Client,
}

impl HuggingFaceEmbedder {
    pub fn new(config: HuggingFaceConfig) -> Result<Self, CommonError> {
        let http = reqwest::Client::builder()
            .user_agent("farm2table/assistant")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &HuggingFaceConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Nested(Vec<Vec<f32>>),
    Flat(Vec<f32>),
    Wrapped { embeddings: EmbeddingsField },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingsField {
    Nested(Vec<Vec<f32>>),
    Flat(Vec<f32>),
}

impl FeatureExtractionResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        let vector = match self {
            Self::Nested(rows) | Self::Wrapped { embeddings: EmbeddingsField::Nested(rows) } => {
                rows.into_iter().next()?
            }
            Self::Flat(v) | Self::Wrapped { embeddings: EmbeddingsField::Flat(v) } => v,
        };
        (!vector.is_empty()).then_some(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        let key = self.config.usable_key().ok_or_else(|| {
            CommonError::Credentials("HUGGINGFACE_API_KEY is not configured".to_string())
        })?;

        let url = format!("{}/{}", self.config.base_url, self.config.model);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(key)
            .timeout(self.config.timeout)
            .json(&FeatureExtractionRequest { inputs: text })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CommonError::Embedding(format!(
                "inference endpoint returned {status}"
            )));
        }

        let body = resp.bytes().await?;
        let parsed: FeatureExtractionResponse = serde_json::from_slice(&body)
            .map_err(|e| CommonError::Embedding(format!("unrecognised response shape: {e}")))?;
        let vector = parsed
            .into_vector()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))?;

        debug!(dimensions = vector.len(), "query embedded");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Option<Vec<f32>> {
        serde_json::from_str::<FeatureExtractionResponse>(raw)
            .ok()
            .and_then(FeatureExtractionResponse::into_vector)
    }

    #[test]
    fn accepts_all_known_response_shapes() {
        assert_eq!(parse("[[0.5, -0.5]]"), Some(vec![0.5, -0.5]));
        assert_eq!(parse("[0.25, 0.75]"), Some(vec![0.25, 0.75]));
        assert_eq!(parse(r#"{"embeddings": [[1.0, 0.0]]}"#), Some(vec![1.0, 0.0]));
        assert_eq!(parse(r#"{"embeddings": [0.0, 1.0]}"#), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn rejects_empty_and_foreign_shapes() {
        assert_eq!(parse("[]"), None);
        assert_eq!(parse("[[]]"), None);
        assert_eq!(parse(r#"{"error": "Model is loading"}"#), None);
    }

    #[test]
    fn placeholder_and_short_keys_are_unusable() {
        let mut config = HuggingFaceConfig {
            api_key: Some(PLACEHOLDER_KEY.to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(config.usable_key().is_none());

        config.api_key = Some("hf_short".to_string());
        assert!(config.usable_key().is_none());

        config.api_key = None;
        assert!(config.usable_key().is_none());

        config.api_key = Some("hf_abcdefghijklmnopqrstuvwxyz".to_string());
        assert_eq!(config.usable_key(), Some("hf_abcdefghijklmnopqrstuvwxyz"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let embedder = HuggingFaceEmbedder::new(HuggingFaceConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(50),
        })
        .expect("client builds");
        let err = embedder.embed("kale").await.unwrap_err();
        assert!(matches!(err, CommonError::Credentials(_)));
    }
}
