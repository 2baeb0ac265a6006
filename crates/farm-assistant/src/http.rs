/// HTTP surface, mounted at the same paths the web front end already calls.
///
/// - `POST /api/ai/chat`
/// - `POST /api/carbon-calculator`
/// - `GET  /api/orders/weekly-bundle?cityId=..&seed=..`
/// - `POST /api/nutrition/advice`
/// - `GET  /healthz`
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use crate::bundle::{current_week_seed, Catalog};
use crate::carbon;
use crate::nutrition;
use crate::chat::{ChatError, ChatPipeline};
use crate::rate_limit::retry_after_secs;
use farm_common::api::{
    CarbonRequest, ChatRequest, NutritionRequest, WeeklyBundleParams, WeeklyBundleResponse,
};
use farm_common::gemini::TextGenerator;

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<ChatPipeline>,
    pub generator: Arc<dyn TextGenerator>,
    pub catalog: Arc<Catalog>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/ai/chat", post(chat))
        .route("/api/carbon-calculator", post(carbon_calculator))
        .route("/api/orders/weekly-bundle", get(weekly_bundle))
        .route("/api/nutrition/advice", post(nutrition_advice))
        .route("/healthz", get(healthz))
        .with_state(state)
}

fn failure(err: ChatError) -> Response {
    let retry_after = err.retry_after();
    let (status, body) = err.into_failure();
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(body)).into_response();
    if let Some(wait) = retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(wait)));
    }
    response
}

async fn chat(State(state): State<HttpState>, body: Bytes) -> Response {
    // Parsed by hand so a malformed body gets the usual failure payload.
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "chat request body was not valid JSON");
            return failure(ChatError::Internal(format!("invalid request body: {e}")));
        }
    };

    // Run on its own task so a panic anywhere in the pipeline becomes a 500, not a
    // dropped connection.
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = tokio::spawn(async move { pipeline.answer(&request).await }).await;

    match outcome {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => failure(e),
        Err(join_err) => {
            error!(error = %join_err, "chat pipeline task failed");
            failure(ChatError::Internal(String::new()))
        }
    }
}

async fn carbon_calculator(State(state): State<HttpState>, body: Bytes) -> Response {
    let invalid = || (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid input" })));

    let request: CarbonRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "carbon calculator body rejected");
            return invalid().into_response();
        }
    };
    match carbon::estimate(state.generator.as_ref(), &request).await {
        Ok(estimate) => Json(estimate).into_response(),
        Err(e) => {
            warn!(error = %e, "carbon calculator input rejected");
            invalid().into_response()
        }
    }
}

async fn nutrition_advice(State(state): State<HttpState>, body: Bytes) -> Response {
    let invalid = || (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid input" })));

    let request: NutritionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "nutrition advice body rejected");
            return invalid().into_response();
        }
    };
    match nutrition::advise(state.generator.as_ref(), &state.catalog, &request).await {
        Ok(advice) => Json(advice).into_response(),
        Err(e) => {
            warn!(error = %e, "nutrition advice input rejected");
            invalid().into_response()
        }
    }
}

async fn weekly_bundle(
    State(state): State<HttpState>,
    Query(params): Query<WeeklyBundleParams>,
) -> Response {
    let city_id = params.city_id.trim();
    if city_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "cityId is required" })),
        )
            .into_response();
    }
    let seed = params.seed.unwrap_or_else(current_week_seed);
    let items = state.catalog.weekly_bundle(city_id, seed);
    Json(WeeklyBundleResponse { items }).into_response()
}

async fn healthz(State(state): State<HttpState>) -> Response {
    Json(json!({
        "status": "ok",
        "documents": state.pipeline.corpus().len(),
        "products": state.catalog.len(),
    }))
    .into_response()
}
