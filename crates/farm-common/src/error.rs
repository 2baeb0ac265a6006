/// Error types shared across Farm2Table service crates.
///
/// These errors represent failures in infrastructure components (the embedding service,
/// its HTTP transport, credentials) that are common to every service. Application-specific
/// errors should be defined in each service crate and wrap `CommonError` via `#[from]`.
///
/// Redis failures never surface here: `RedisCache` degrades to `None`/`false` instead.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("credentials missing or invalid: {0}")]
    Credentials(String),

    #[error("embedding error: {0}")]
    Embedding(String),
}
