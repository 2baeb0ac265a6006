use std::path::{Path, PathBuf};

use crate::error::AppError;

const DEFAULT_EMBEDDING_CACHE_TTL_SECS: u64 = 3600;

/// Application configuration loaded explicitly from environment variables.
///
/// Credentials for the embedding and generation services are read by their clients in
/// `farm_common`; only service-level settings live here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL (e.g. "redis://127.0.0.1:6379"). `None` disables caching and
    /// usage counters.
    pub redis_url: Option<String>,
    /// JSON array of knowledge documents loaded at startup.
    pub corpus_path: PathBuf,
    /// JSON array of products for weekly bundles. `None` means an empty catalog.
    pub products_path: Option<PathBuf>,
    /// Serve HTTP on this address instead of MCP on stdio.
    pub http_listen_addr: Option<String>,
    /// Embed documents that ship without an embedding before serving.
    pub embed_corpus_on_start: bool,
    /// TTL for cached query embeddings.
    pub embedding_cache_ttl_secs: u64,
}

impl Config {
    /// Required:
    /// - `CORPUS_PATH`: path to the knowledge corpus JSON file
    ///
    /// Optional:
    /// - `PRODUCTS_PATH`: path to the product catalog JSON file
    /// - `REDIS_URL`: Redis connection string (omit to disable caching)
    /// - `HTTP_LISTEN_ADDR`: e.g. "0.0.0.0:8080" (omit to serve MCP on stdio)
    /// - `CORPUS_EMBED_ON_START`: "1"/"true" to fill in missing document embeddings
    /// - `EMBEDDING_CACHE_TTL_SECS` (default: 3600)
    pub fn from_env() -> Result<Self, AppError> {
        let corpus_path = std::env::var("CORPUS_PATH").map_err(|_| {
            AppError::Config("CORPUS_PATH environment variable is required".to_string())
        })?;
        let corpus_path = PathBuf::from(corpus_path);
        require_file(&corpus_path)?;

        let products_path = std::env::var("PRODUCTS_PATH").ok().map(PathBuf::from);
        if let Some(path) = &products_path {
            require_file(path)?;
        }

        let embed_corpus_on_start = std::env::var("CORPUS_EMBED_ON_START")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let embedding_cache_ttl_secs = std::env::var("EMBEDDING_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_EMBEDDING_CACHE_TTL_SECS);

        Ok(Self {
            redis_url: std::env::var("REDIS_URL").ok(),
            corpus_path,
            products_path,
            http_listen_addr: std::env::var("HTTP_LISTEN_ADDR").ok(),
            embed_corpus_on_start,
            embedding_cache_ttl_secs,
        })
    }
}

fn require_file(path: &Path) -> Result<(), AppError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "required file not found: {}",
            path.display()
        )))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
