mod bundle;
mod cache;
mod carbon;
mod chat;
mod config;
mod corpus;
mod error;
mod http;
mod llm_json;
mod model;
mod nutrition;
mod prompt;
mod rank;
mod rate_limit;
mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bundle::Catalog;
use cache::EmbeddingCache;
use chat::ChatPipeline;
use config::Config;
use corpus::Corpus;
use farm_common::embedding::{EmbeddingProvider, HuggingFaceConfig, HuggingFaceEmbedder};
use farm_common::gemini::{GeminiClient, GeminiClientConfig, TextGenerator};
use farm_common::redis::RedisCache;
use farm_common::usage::UsageTracker;
use http::HttpState;
use rate_limit::RateLimiter;
use server::FarmAssistantServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting farm-assistant");

    let config = Config::from_env()?;
    info!(
        corpus_path = %config.corpus_path.display(),
        products = config.products_path.is_some(),
        redis = config.redis_url.is_some(),
        http = config.http_listen_addr.is_some(),
        "configuration loaded"
    );

    let redis_cache = RedisCache::new(config.redis_url.as_deref());
    if redis_cache.is_available().await {
        info!("redis connected");
    } else {
        info!("redis unavailable, running without cache or usage counters");
    }

    let hf_config = HuggingFaceConfig::from_env();
    if hf_config.usable_key().is_none() {
        warn!("HUGGINGFACE_API_KEY not set, ranking will fall back to corpus order");
    }
    info!(
        model = %hf_config.model,
        base_url = %hf_config.base_url,
        "embedding client configured"
    );
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HuggingFaceEmbedder::new(hf_config)?);

    let mut corpus = Corpus::load(&config.corpus_path)?;
    if corpus.is_empty() {
        warn!("knowledge corpus is empty, answers will have no sources");
    }
    if config.embed_corpus_on_start {
        let embedded = corpus.index_missing(embedder.as_ref()).await;
        info!(embedded, "corpus embeddings filled in");
    }
    let dimensions = corpus.embedding_dimensions();
    if !dimensions.is_empty() && !dimensions.contains(&embedder.dimensions()) {
        warn!(
            corpus = ?dimensions,
            embedder = embedder.dimensions(),
            "corpus embedding size differs from the embedding model"
        );
    }
    let corpus = Arc::new(corpus);

    let gemini_config = GeminiClientConfig::from_env();
    if let Err(e) = gemini_config.checked_key() {
        warn!(error = %e, "generation will fail until GEMINI_API_KEY is set");
    }
    info!(
        model = %gemini_config.model,
        timeout_ms = gemini_config.default_timeout.as_millis(),
        max_attempts = gemini_config.max_attempts,
        "gemini client configured"
    );
    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(gemini_config)?);

    let catalog = match &config.products_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::default(),
    };
    let catalog = Arc::new(catalog);

    let limiter = RateLimiter::from_env();
    if let Some(limiter) = &limiter {
        info!(rps = limiter.rps(), "local rate limit enabled");
    }

    let pipeline = ChatPipeline::new(corpus, embedder, Arc::clone(&generator))
        .with_cache(EmbeddingCache::new(
            redis_cache.clone(),
            config.embedding_cache_ttl_secs,
        ))
        .with_usage(UsageTracker::new(redis_cache))
        .with_limiter(limiter);
    let pipeline = Arc::new(pipeline);

    if let Some(addr) = &config.http_listen_addr {
        let app = http::router(HttpState {
            pipeline,
            generator,
            catalog,
        });
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "HTTP server ready");
        axum::serve(listener, app).await?;
        info!("HTTP server shut down");
    } else {
        let server = FarmAssistantServer::new(pipeline, generator, catalog);
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
