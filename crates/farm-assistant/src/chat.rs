/// Retrieval-augmented chat: filter -> embed -> rank -> compose -> generate.
///
/// Each request runs the stages in order with no state shared between requests beyond the
/// read-only corpus. Embedding failures are absorbed (ranking falls back to corpus order);
/// generation failures are surfaced with a category so the caller can show the right
/// message.
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache::EmbeddingCache;
use crate::corpus::Corpus;
use crate::prompt::{render_context, user_prompt, SYSTEM_PROMPT};
use crate::rank::rank;
use crate::rate_limit::{retry_after_secs, RateLimiter};
use farm_common::api::{ChatErrorBody, ChatRequest, ChatResponse, SourceRef};
use farm_common::embedding::EmbeddingProvider;
use farm_common::gemini::{GenerationError, GenerationErrorKind, TextGenerator};
use farm_common::redis::RedisCache;
use farm_common::usage::UsageTracker;

const KEY_HELP_URL: &str = "https://aistudio.google.com/app/apikey";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("generation credentials missing or invalid: {0}")]
    Credentials(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GenerationError> for ChatError {
    fn from(e: GenerationError) -> Self {
        match e.kind {
            GenerationErrorKind::Credentials => Self::Credentials(e.message),
            GenerationErrorKind::RateLimited => Self::RateLimited { retry_after: None },
            GenerationErrorKind::Other => Self::Generation(e.message),
        }
    }
}

impl ChatError {
    /// How long the caller should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status and customer-facing body for this failure.
    pub fn into_failure(self) -> (u16, ChatErrorBody) {
        match self {
            Self::InvalidRequest(reason) => (
                400,
                ChatErrorBody {
                    error: reason,
                    response: "Please type a question for the assistant.".to_string(),
                    rate_limited: false,
                },
            ),
            Self::Credentials(_) => (
                500,
                ChatErrorBody {
                    error: "GEMINI_API_KEY is not configured or invalid. \
Please check the assistant's environment configuration."
                        .to_string(),
                    response: format!(
                        "Sorry, the AI assistant is not configured. \
Please check your API key configuration at {KEY_HELP_URL}"
                    ),
                    rate_limited: false,
                },
            ),
            Self::RateLimited { retry_after } => {
                let hint = retry_after
                    .map(|d| format!(" in about {} seconds", retry_after_secs(d)))
                    .unwrap_or_default();
                (
                    429,
                    ChatErrorBody {
                        error: format!(
                            "Rate limit exceeded. Please wait a moment and try again{hint}."
                        ),
                        response: format!(
                            "I'm getting a lot of questions right now. \
Please wait a moment and try again{hint}."
                        ),
                        rate_limited: true,
                    },
                )
            }
            Self::Generation(message) => (
                500,
                ChatErrorBody {
                    error: format!("Failed to get AI response: {message}"),
                    response: "Sorry, I encountered an error while processing your request. \
Please try again later."
                        .to_string(),
                    rate_limited: false,
                },
            ),
            Self::Internal(message) => (
                500,
                ChatErrorBody {
                    error: if message.is_empty() {
                        "Failed to get AI response".to_string()
                    } else {
                        message
                    },
                    response: "Sorry, I encountered an error. Please try again.".to_string(),
                    rate_limited: false,
                },
            ),
        }
    }
}

pub struct ChatPipeline {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    cache: EmbeddingCache,
    limiter: Option<RateLimiter>,
    usage: UsageTracker,
}

impl ChatPipeline {
    pub fn new(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            corpus,
            embedder,
            generator,
            cache: EmbeddingCache::disabled(),
            limiter: None,
            usage: UsageTracker::new(RedisCache::disabled()),
        }
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_limiter(mut self, limiter: Option<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_usage(mut self, usage: UsageTracker) -> Self {
        self.usage = usage;
        self
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Embed the query, or return an empty vector if the embedding service fails.
    pub async fn embed_query(&self, message: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.get(message).await {
            debug!(dimensions = cached.len(), "query embedding cache hit");
            return cached;
        }
        match self.embedder.embed(message).await {
            Ok(vector) => {
                self.cache.set(message, &vector).await;
                vector
            }
            Err(e) => {
                warn!(error = %e, "query embedding failed, ranking without semantic scores");
                self.usage.record_embedding_fallback().await;
                Vec::new()
            }
        }
    }

    pub async fn answer(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }

        if let Some(limiter) = &self.limiter {
            if let Err(wait) = limiter.check().await {
                warn!(rps = limiter.rps(), wait_ms = wait.as_millis(), "chat request rate limited locally");
                self.usage.record_failure(GenerationErrorKind::RateLimited.as_str()).await;
                return Err(ChatError::RateLimited {
                    retry_after: Some(wait),
                });
            }
        }

        // Role and history are accepted on the wire but do not shape the prompt.
        debug!(
            role = request.role.as_deref().unwrap_or("-"),
            history = request.history.len(),
            "chat request received"
        );

        let candidates = self.corpus.filter_by_city(request.city_id.as_deref());
        let query = self.embed_query(message).await;
        let ranked = rank(&candidates, &query);

        let context = render_context(&ranked);
        let prompt = user_prompt(&context, message);

        let response = match self.generator.generate(&prompt, SYSTEM_PROMPT).await {
            Ok(text) => text,
            Err(e) => {
                error!(kind = e.kind.as_str(), error = %e, "generation failed");
                self.usage.record_failure(e.kind.as_str()).await;
                return Err(e.into());
            }
        };
        self.usage.record_generation(self.generator.model()).await;

        let sources: Vec<SourceRef> = ranked
            .iter()
            .map(|s| SourceRef {
                id: s.doc.id.clone(),
                title: s.doc.title.clone(),
            })
            .collect();

        info!(
            city = request.city_id.as_deref().unwrap_or("-"),
            candidates = candidates.len(),
            semantic = !query.is_empty(),
            sources = sources.len(),
            "chat answered"
        );

        Ok(ChatResponse { response, sources })
    }
}
