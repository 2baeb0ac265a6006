use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::warn;

use crate::bundle::{current_week_seed, Catalog};
use crate::carbon;
use crate::chat::ChatPipeline;
use crate::nutrition;
use farm_common::api::{
    CarbonEstimate, CarbonRequest, ChatRequest, ChatResponse, NutritionAdvice, NutritionRequest,
    WeeklyBundleParams, WeeklyBundleResponse,
};
use farm_common::gemini::TextGenerator;
use farm_common::usage::UsageStats;

#[derive(Clone)]
pub struct FarmAssistantServer {
    pipeline: Arc<ChatPipeline>,
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<Catalog>,
    tool_router: ToolRouter<FarmAssistantServer>,
}

impl FarmAssistantServer {
    pub fn new(
        pipeline: Arc<ChatPipeline>,
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            pipeline,
            generator,
            catalog,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl FarmAssistantServer {
    #[tool(description = "Answer a customer question about Farm2Table using the knowledge base. Pass cityId to include city-specific documents. Returns the answer and up to three source documents.")]
    async fn ask_assistant(
        &self,
        Parameters(request): Parameters<ChatRequest>,
    ) -> Result<Json<ChatResponse>, String> {
        match self.pipeline.answer(&request).await {
            Ok(response) => Ok(Json(response)),
            Err(e) => {
                warn!(error = %e, "ask_assistant failed");
                // Same payload the HTTP route returns, so clients can read rateLimited.
                let (_, body) = e.into_failure();
                Err(serde_json::to_string(&body).unwrap_or(body.error))
            }
        }
    }

    #[tool(description = "Estimate monthly kg of CO2 saved by replacing grocery trips with shared delivery. trips_per_week must be 0-20, km_round_trip 0-100.")]
    async fn estimate_carbon(
        &self,
        Parameters(request): Parameters<CarbonRequest>,
    ) -> Result<Json<CarbonEstimate>, String> {
        let estimate = carbon::estimate(self.generator.as_ref(), &request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(estimate))
    }

    #[tool(description = "Pick this week's five-product bundle for a city. The same cityId and seed always give the same bundle; seed defaults to the current week.")]
    async fn weekly_bundle(
        &self,
        Parameters(params): Parameters<WeeklyBundleParams>,
    ) -> Result<Json<WeeklyBundleResponse>, String> {
        let city_id = params.city_id.trim();
        if city_id.is_empty() {
            return Err("cityId must not be empty".to_string());
        }
        let seed = params.seed.unwrap_or_else(current_week_seed);
        Ok(Json(WeeklyBundleResponse {
            items: self.catalog.weekly_bundle(city_id, seed),
        }))
    }

    #[tool(description = "Review a week of produce for nutrient gaps. weeklyItems lists catalog product ids with quantities; allergies is free text. Returns weekly totals, target nutrients, gaps and up to five recommendations.")]
    async fn nutrition_advice(
        &self,
        Parameters(request): Parameters<NutritionRequest>,
    ) -> Result<Json<NutritionAdvice>, String> {
        let advice = nutrition::advise(self.generator.as_ref(), &self.catalog, &request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(advice))
    }

    #[tool(description = "Get assistant usage counters: generations per model, failures per kind, and embedding fallbacks.")]
    async fn get_usage_stats(&self) -> Result<Json<UsageStats>, String> {
        Ok(Json(self.pipeline.usage().get_usage_stats().await))
    }
}

#[tool_handler]
impl ServerHandler for FarmAssistantServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "farm-assistant".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Farm2Table customer assistant over {} knowledge documents. Use ask_assistant for \
customer questions, estimate_carbon for the delivery CO2 calculator, weekly_bundle for Basic-plan \
bundles, and nutrition_advice for weekly nutrient gaps. Usage counters are available via get_usage_stats.",
                self.pipeline.corpus().len()
            )),
        }
    }
}
