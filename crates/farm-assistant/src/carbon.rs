/// Monthly CO2 savings estimate for a household that replaces grocery trips with delivery.
///
/// The LLM is asked for a narrated estimate; a deterministic formula backs every field it
/// omits and replaces the whole answer when the call or the JSON extraction fails.
use serde::Deserialize;
use tracing::warn;

use crate::llm_json::{first_json_object, round2, InvalidInput};
use farm_common::api::{CarbonEstimate, CarbonRequest, VehicleClass};
use farm_common::gemini::TextGenerator;

/// Average weeks per month.
const WEEKS_PER_MONTH: f64 = 4.33;
const MAX_TRIPS_PER_WEEK: f64 = 20.0;
const MAX_KM_ROUND_TRIP: f64 = 100.0;

const SYSTEM_PROMPT: &str = "You are an analyst estimating monthly CO2 reduction for a household \
that uses a Farm2Table subscription. Be conservative and show the math clearly.";

/// kg CO2 per km driven.
pub fn emission_factor(class: VehicleClass) -> f64 {
    match class {
        VehicleClass::Compact => 0.12,
        VehicleClass::Midsize => 0.15,
        VehicleClass::Suv => 0.18,
        VehicleClass::Truck => 0.22,
    }
}

pub fn validate(request: &CarbonRequest) -> Result<(), InvalidInput> {
    if !(0.0..=MAX_TRIPS_PER_WEEK).contains(&request.trips_per_week) {
        return Err(InvalidInput(format!(
            "trips_per_week must be between 0 and {MAX_TRIPS_PER_WEEK}"
        )));
    }
    if !(0.0..=MAX_KM_ROUND_TRIP).contains(&request.km_round_trip) {
        return Err(InvalidInput(format!(
            "km_round_trip must be between 0 and {MAX_KM_ROUND_TRIP}"
        )));
    }
    Ok(())
}

pub fn deterministic_kg(request: &CarbonRequest) -> f64 {
    request.trips_per_week
        * request.km_round_trip
        * emission_factor(request.vehicle_class)
        * WEEKS_PER_MONTH
}

/// The formula-only answer.
pub fn fallback_estimate(request: &CarbonRequest) -> CarbonEstimate {
    let kg = deterministic_kg(request);
    let factor = emission_factor(request.vehicle_class);
    CarbonEstimate {
        estimated_monthly_kg_co2_saved: round2(kg),
        assumptions: vec![
            format!("Eliminates {} trips per week", request.trips_per_week),
            format!("Round trip distance: {} km", request.km_round_trip),
            format!("Vehicle emissions: {factor} kg CO2/km"),
            "Shared delivery reduces per-household impact".to_string(),
        ],
        explanation: format!(
            "By using Farm2Table, you eliminate {} weekly trips, saving approximately {} kg CO2 per month.",
            request.trips_per_week,
            kg.round()
        ),
    }
}

fn user_prompt(request: &CarbonRequest) -> String {
    format!(
        "Inputs:\n\
Trips per week: {trips}\n\
Round trip distance km: {km}\n\
Vehicle class: {class} ({factor} kg CO2 per km)\n\
\n\
Assumptions:\n\
Using Farm2Table eliminates those private car trips. Delivery is route optimized and shared. \
Allocate twenty percent of a delivery van trip to each household.\n\
\n\
Task:\n\
Return JSON with:\n\
- estimated_monthly_kg_co2_saved: number\n\
- assumptions: list of strings\n\
- explanation: short string\n\
\n\
Return only valid JSON, no markdown formatting.",
        trips = request.trips_per_week,
        km = request.km_round_trip,
        class = request.vehicle_class.as_str(),
        factor = emission_factor(request.vehicle_class),
    )
}

#[derive(Debug, Deserialize)]
struct LlmEstimate {
    estimated_monthly_kg_co2_saved: Option<f64>,
    assumptions: Option<Vec<String>>,
    explanation: Option<String>,
}

/// Parse the first `{...}` span of an LLM reply, filling gaps from the formula.
fn parse_reply(reply: &str, request: &CarbonRequest) -> Option<CarbonEstimate> {
    let json = first_json_object(reply)?;
    let parsed: LlmEstimate = serde_json::from_str(json)
        .inspect_err(|e| warn!(error = %e, "carbon estimate reply was not valid JSON"))
        .ok()?;
    Some(CarbonEstimate {
        estimated_monthly_kg_co2_saved: parsed
            .estimated_monthly_kg_co2_saved
            .filter(|kg| kg.is_finite() && *kg > 0.0)
            .unwrap_or_else(|| deterministic_kg(request)),
        assumptions: parsed.assumptions.unwrap_or_default(),
        explanation: parsed
            .explanation
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "Estimated based on reduced trips.".to_string()),
    })
}

/// Validate, ask the LLM, and fall back to the formula on any failure.
pub async fn estimate(
    generator: &dyn TextGenerator,
    request: &CarbonRequest,
) -> Result<CarbonEstimate, InvalidInput> {
    validate(request)?;
    match generator.generate(&user_prompt(request), SYSTEM_PROMPT).await {
        Ok(reply) => {
            if let Some(estimate) = parse_reply(&reply, request) {
                return Ok(estimate);
            }
            warn!("carbon estimate reply had no usable JSON, using formula");
        }
        Err(e) => warn!(error = %e, "carbon estimate generation failed, using formula"),
    }
    Ok(fallback_estimate(request))
}
