/// Client for the Gemini `generateContent` REST endpoint.
///
/// Callers see one operation, [`TextGenerator::generate`], and one error type whose
/// [`GenerationErrorKind`] tells them whether the failure was a credential problem, a rate
/// limit, or anything else. Retrying lives here and nowhere else: 429s, 5xx responses and
/// transport failures are retried with capped exponential backoff.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const PLACEHOLDER_KEY: &str = "your_gemini_api_key_here";
const MIN_KEY_LEN: usize = 20;
const KEY_HELP_URL: &str = "https://aistudio.google.com/app/apikey";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `user_prompt` under the instructions in `system_prompt`.
    async fn generate(&self, user_prompt: &str, system_prompt: &str)
        -> Result<String, GenerationError>;

    /// Model identifier, used for logging and usage accounting.
    fn model(&self) -> &str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Credentials,
    RateLimited,
    Other,
}

impl GenerationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::RateLimited => "rate_limited",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a raw upstream message, deriving its kind from the text.
    ///
    /// Credential markers win over rate-limit markers when both are present.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_credential_message(&message) {
            GenerationErrorKind::Credentials
        } else if is_rate_limit_message(&message) {
            GenerationErrorKind::RateLimited
        } else {
            GenerationErrorKind::Other
        };
        Self { kind, message }
    }
}

fn is_credential_message(message: &str) -> bool {
    ["API_KEY", "api key", "API key", "GEMINI", "Gemini"]
        .iter()
        .any(|marker| message.contains(marker))
}

fn is_rate_limit_message(message: &str) -> bool {
    ["429", "Too Many Requests", "Resource exhausted"]
        .iter()
        .any(|marker| message.contains(marker))
}

#[derive(Clone, Debug)]
pub struct GeminiClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub default_timeout: Duration,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl GeminiClientConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string());

        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let default_timeout = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_attempts = std::env::var("GEMINI_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(3);

        let initial_backoff = std::env::var("GEMINI_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(1_000));

        let max_backoff = std::env::var("GEMINI_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(8_000));

        let max_error_body_bytes = std::env::var("GEMINI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            default_timeout,
            max_attempts,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }

    /// Validate the configured key. Runs on every call rather than at startup so the
    /// service still boots (and answers with an actionable error) without one.
    pub fn checked_key(&self) -> Result<&str, GenerationError> {
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(GenerationError::new(
                GenerationErrorKind::Credentials,
                format!(
                    "GEMINI_API_KEY is not configured. Get your API key from {KEY_HELP_URL}"
                ),
            ));
        };
        if key == PLACEHOLDER_KEY || key.len() < MIN_KEY_LEN {
            return Err(GenerationError::new(
                GenerationErrorKind::Credentials,
                format!(
                    "GEMINI_API_KEY is invalid: expected at least {MIN_KEY_LEN} characters. \
Get your API key from {KEY_HELP_URL}"
                ),
            ));
        }
        Ok(key)
    }
}

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("response contained no candidate text")]
    EmptyCandidates,
}

impl CallError {
    fn into_generation_error(self) -> GenerationError {
        match self {
            Self::Upstream { status, message } => match status {
                StatusCode::TOO_MANY_REQUESTS => GenerationError::new(
                    GenerationErrorKind::RateLimited,
                    format!(
                        "Rate limit exceeded (429 Too Many Requests): {message}. \
Please wait a moment and try again."
                    ),
                ),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::new(
                    GenerationErrorKind::Credentials,
                    format!("Invalid API key ({status}): {message}. Check GEMINI_API_KEY."),
                ),
                _ => GenerationError::classify(format!("{status}: {message}")),
            },
            other => GenerationError::new(GenerationErrorKind::Other, other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiClientConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("farm2table/assistant")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiClientConfig {
        &self.config
    }

    async fn generate_once(
        &self,
        key: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, CallError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .timeout(self.config.default_timeout)
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(to_upstream_error(resp, self.config.max_error_body_bytes).await);
        }

        let body = resp.json::<GenerateContentResponse>().await?;
        body.first_text().ok_or(CallError::EmptyCandidates)
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CallError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.config.max_attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "gemini request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        user_prompt: &str,
        system_prompt: &str,
    ) -> Result<String, GenerationError> {
        let key = self.config.checked_key()?;
        let request = GenerateContentRequest::new(user_prompt, system_prompt);
        let text = self
            .request_with_retry(|| self.generate_once(key, &request))
            .await
            .map_err(CallError::into_generation_error)?;
        debug!(model = %self.config.model, chars = text.len(), "generation complete");
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn should_retry(err: &CallError) -> bool {
    match err {
        CallError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        CallError::Upstream { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        CallError::EmptyCandidates => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> CallError {
    let status = resp.status();
    let body = read_limited_text(resp, max_error_body_bytes).await;
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or(body);
    CallError::Upstream { status, message }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

impl GenerateContentRequest {
    fn new(user_prompt: &str, system_prompt: &str) -> Self {
        let system_instruction = (!system_prompt.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: Some(system_prompt.to_string()),
            }],
        });
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(user_prompt.to_string()),
                }],
            }],
            system_instruction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> GeminiClientConfig {
        GeminiClientConfig {
            api_key: key.map(str::to_string),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_timeout: Duration::from_secs(1),
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_error_body_bytes: 1024,
        }
    }

    #[test]
    fn classify_detects_credential_markers() {
        for msg in [
            "GEMINI_API_KEY is not configured",
            "invalid api key supplied",
            "API key not valid. Please pass a valid API key.",
            "Gemini refused the request",
        ] {
            assert_eq!(
                GenerationError::classify(msg).kind,
                GenerationErrorKind::Credentials,
                "{msg}"
            );
        }
    }

    #[test]
    fn classify_detects_rate_limit_markers() {
        for msg in [
            "upstream 429",
            "Too Many Requests",
            "Resource exhausted for project",
        ] {
            assert_eq!(
                GenerationError::classify(msg).kind,
                GenerationErrorKind::RateLimited,
                "{msg}"
            );
        }
    }

    #[test]
    fn credential_markers_take_precedence_over_rate_limit() {
        let err = GenerationError::classify("429 from Gemini");
        assert_eq!(err.kind, GenerationErrorKind::Credentials);
    }

    #[test]
    fn classify_falls_back_to_other() {
        let err = GenerationError::classify("connection reset by peer");
        assert_eq!(err.kind, GenerationErrorKind::Other);
        assert_eq!(err.to_string(), "connection reset by peer");
    }

    #[test]
    fn checked_key_rejects_missing_placeholder_and_short_keys() {
        for key in [None, Some(""), Some(PLACEHOLDER_KEY), Some("too-short")] {
            let err = config_with_key(key).checked_key().unwrap_err();
            assert_eq!(err.kind, GenerationErrorKind::Credentials);
            assert!(err.message.contains("GEMINI_API_KEY"));
        }
        let config = config_with_key(Some("AIzaSyA-0123456789abcdefghij"));
        assert_eq!(config.checked_key().unwrap(), "AIzaSyA-0123456789abcdefghij");
    }

    #[test]
    fn upstream_status_maps_to_kind() {
        let rate = CallError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "quota".to_string(),
        }
        .into_generation_error();
        assert_eq!(rate.kind, GenerationErrorKind::RateLimited);

        let auth = CallError::Upstream {
            status: StatusCode::FORBIDDEN,
            message: "denied".to_string(),
        }
        .into_generation_error();
        assert_eq!(auth.kind, GenerationErrorKind::Credentials);

        let bad_key = CallError::Upstream {
            status: StatusCode::BAD_REQUEST,
            message: "API key not valid".to_string(),
        }
        .into_generation_error();
        assert_eq!(bad_key.kind, GenerationErrorKind::Credentials);

        let server = CallError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".to_string(),
        }
        .into_generation_error();
        assert_eq!(server.kind, GenerationErrorKind::Other);
    }

    #[test]
    fn retries_only_transient_statuses() {
        let transient = CallError::Upstream {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: String::new(),
        };
        let permanent = CallError::Upstream {
            status: StatusCode::BAD_REQUEST,
            message: String::new(),
        };
        assert!(should_retry(&transient));
        assert!(!should_retry(&permanent));
        assert!(!should_retry(&CallError::EmptyCandidates));
    }

    #[test]
    fn backoff_is_capped() {
        let delay = backoff_delay(Duration::from_millis(1_000), Duration::from_millis(4_000), 10);
        assert!(delay >= Duration::from_millis(4_000));
        assert!(delay <= Duration::from_millis(5_000));
    }

    #[test]
    fn request_puts_system_prompt_in_system_instruction() {
        let req = GenerateContentRequest::new("What's fresh?", "Be friendly.");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What's fresh?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be friendly.");
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("Hello there"));

        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(empty.first_text(), None);
    }

    #[tokio::test]
    async fn generate_without_key_is_a_credential_error() {
        let client = GeminiClient::new(config_with_key(None)).unwrap();
        let err = client.generate("hi", "sys").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Credentials);
    }
}
