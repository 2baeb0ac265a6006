//! Request and response types shared by the HTTP and MCP surfaces.
//!
//! Chat and bundle payloads use camelCase on the wire (`cityId`, `rateLimited`, `farmId`);
//! the carbon calculator keeps the snake_case field names its clients already send.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The customer's question.
    #[serde(default)]
    pub message: String,
    /// Restrict retrieval to documents for this city (plus city-agnostic ones).
    #[serde(default)]
    pub city_id: Option<String>,
    /// Caller role (customer, farmer, driver). Accepted, currently not used for prompting.
    #[serde(default)]
    pub role: Option<String>,
    /// Prior turns. Accepted, currently not injected into the prompt.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct HistoryMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
}

/// Failure payload. `response` is always something the UI can show to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatErrorBody {
    pub error: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rate_limited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Compact,
    #[default]
    Midsize,
    Suv,
    Truck,
}

impl VehicleClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Midsize => "midsize",
            Self::Suv => "suv",
            Self::Truck => "truck",
        }
    }
}

fn default_km_round_trip() -> f64 {
    8.0
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CarbonRequest {
    /// Grocery car trips per week replaced by delivery (0-20).
    pub trips_per_week: f64,
    /// Round-trip distance per trip in km (0-100, default 8).
    #[serde(default = "default_km_round_trip")]
    pub km_round_trip: f64,
    #[serde(default)]
    pub vehicle_class: VehicleClass,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct CarbonEstimate {
    pub estimated_monthly_kg_co2_saved: f64,
    pub assumptions: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBundleParams {
    /// Missing and blank are both rejected by the caller with the same JSON error.
    #[serde(default)]
    pub city_id: String,
    /// Selection seed. Defaults to the current week number so a city's bundle is stable
    /// for the week.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub price: f64,
    pub farm_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct WeeklyBundleResponse {
    pub items: Vec<BundleItem>,
}

/// Nutrients per unit of a product, or summed over a week's box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Nutrients {
    pub calories: f64,
    pub protein_g: f64,
    pub fiber_g: f64,
    pub vitamin_c_mg: f64,
    pub iron_mg: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyItem {
    /// Catalog product id. Unknown ids are ignored.
    pub id: String,
    /// Units per week. Zero counts as one.
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRequest {
    pub weekly_items: Vec<WeeklyItem>,
    /// Free-text allergies and dietary notes.
    #[serde(default)]
    pub allergies: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Recommendation {
    pub item: String,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct NutritionAdvice {
    pub target_nutrients: Vec<String>,
    pub gaps: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    #[serde(rename = "weeklyTotals")]
    pub weekly_totals: Nutrients,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_accepts_minimal_and_full_payloads() {
        let minimal: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(minimal.message, "hi");
        assert!(minimal.city_id.is_none());
        assert!(minimal.history.is_empty());

        let full: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","cityId":"nyc","role":"customer","history":[{"role":"user","content":"earlier"}]}"#,
        )
        .unwrap();
        assert_eq!(full.city_id.as_deref(), Some("nyc"));
        assert_eq!(full.role.as_deref(), Some("customer"));
        assert_eq!(full.history[0].content, "earlier");
    }

    #[test]
    fn error_body_only_mentions_rate_limit_when_set() {
        let plain = ChatErrorBody {
            error: "e".into(),
            response: "r".into(),
            rate_limited: false,
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("rateLimited").is_none());

        let limited = ChatErrorBody {
            rate_limited: true,
            ..plain
        };
        let json = serde_json::to_value(&limited).unwrap();
        assert_eq!(json["rateLimited"], true);
    }

    #[test]
    fn carbon_request_defaults() {
        let req: CarbonRequest = serde_json::from_str(r#"{"trips_per_week":2}"#).unwrap();
        assert_eq!(req.km_round_trip, 8.0);
        assert_eq!(req.vehicle_class, VehicleClass::Midsize);

        let bad = serde_json::from_str::<CarbonRequest>(
            r#"{"trips_per_week":2,"vehicle_class":"bicycle"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn bundle_params_tolerate_missing_city() {
        let params: WeeklyBundleParams = serde_json::from_str("{}").unwrap();
        assert!(params.city_id.is_empty());
        assert!(params.seed.is_none());
    }

    #[test]
    fn nutrition_wire_casing_matches_the_web_client() {
        let req: NutritionRequest = serde_json::from_str(
            r#"{"weeklyItems":[{"id":"p-kale","quantity":2}],"allergies":"nuts"}"#,
        )
        .unwrap();
        assert_eq!(req.weekly_items[0].quantity, 2.0);
        assert!(serde_json::from_str::<NutritionRequest>(r#"{"weeklyItems":[{"id":"x"}]}"#).is_err());

        let advice = NutritionAdvice {
            target_nutrients: vec![],
            gaps: vec![],
            recommendations: vec![],
            weekly_totals: Nutrients {
                vitamin_c_mg: 1.5,
                ..Nutrients::default()
            },
        };
        let json = serde_json::to_value(&advice).unwrap();
        assert_eq!(json["weeklyTotals"]["vitaminCMg"], 1.5);
        assert!(json.get("target_nutrients").is_some());
    }
}
