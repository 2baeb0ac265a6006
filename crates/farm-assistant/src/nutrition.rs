/// Weekly nutrition review for a subscriber's produce box.
///
/// Weekly totals always come from catalog data. The LLM supplies target nutrients, gaps
/// and recommendations. A reply with no JSON object is mined for keywords; a failed call
/// or a JSON object that does not parse gets general advice instead.
use serde::Deserialize;
use tracing::{debug, warn};

use crate::bundle::Catalog;
use crate::llm_json::{first_json_object, round2, InvalidInput};
use farm_common::api::{Nutrients, NutritionAdvice, NutritionRequest, Recommendation, WeeklyItem};
use farm_common::gemini::TextGenerator;

const SYSTEM_PROMPT: &str = "You are a dietitian style assistant. Analyze a weekly list of \
produce items and recommend missing nutrients precisely.";

const DEFAULT_TARGETS: [&str; 5] = ["Protein", "Fiber", "Vitamin C", "Iron", "Calcium"];

const GENERAL_RECOMMENDATIONS: [(&str, &str); 5] = [
    ("Leafy greens (spinach, kale)", "High in iron, vitamin C, and fiber"),
    ("Legumes (beans, lentils)", "Excellent source of protein and fiber"),
    ("Citrus fruits", "Rich in vitamin C"),
    ("Nuts and seeds", "Good source of protein and healthy fats"),
    ("Whole grains", "High in fiber and B vitamins"),
];

/// The week's items as prompt lines, plus their summed nutrients.
#[derive(Debug, Default)]
pub struct WeeklySummary {
    pub table: String,
    pub totals: Nutrients,
}

pub fn validate(request: &NutritionRequest) -> Result<(), InvalidInput> {
    match request
        .weekly_items
        .iter()
        .find(|item| !item.quantity.is_finite() || item.quantity < 0.0)
    {
        Some(item) => Err(InvalidInput(format!(
            "quantity for {} must be a non-negative number",
            item.id
        ))),
        None => Ok(()),
    }
}

/// Look up each item in the catalog and total its nutrients. Unknown ids are skipped.
pub fn summarize(catalog: &Catalog, items: &[WeeklyItem]) -> WeeklySummary {
    let mut totals = Nutrients::default();
    let mut lines = Vec::with_capacity(items.len());

    for item in items {
        let Some(product) = catalog.product(&item.id) else {
            debug!(id = %item.id, "weekly item not in catalog, skipped");
            continue;
        };
        let quantity = if item.quantity == 0.0 { 1.0 } else { item.quantity };
        let n = product.nutrition;
        totals.calories += n.calories * quantity;
        totals.protein_g += n.protein_g * quantity;
        totals.fiber_g += n.fiber_g * quantity;
        totals.vitamin_c_mg += n.vitamin_c_mg * quantity;
        totals.iron_mg += n.iron_mg * quantity;
        lines.push(format!(
            "{} ({} {}): {} cal, {}g protein, {}g fiber, {}mg vitamin C, {}mg iron",
            product.name,
            quantity,
            product.unit,
            n.calories,
            n.protein_g,
            n.fiber_g,
            n.vitamin_c_mg,
            n.iron_mg
        ));
    }

    WeeklySummary {
        table: lines.join("\n"),
        totals: Nutrients {
            calories: round2(totals.calories),
            protein_g: round2(totals.protein_g),
            fiber_g: round2(totals.fiber_g),
            vitamin_c_mg: round2(totals.vitamin_c_mg),
            iron_mg: round2(totals.iron_mg),
        },
    }
}

fn user_prompt(allergies: &str, table: &str) -> String {
    format!(
        "Allergies and notes:\n{allergies}\n\n\
Weekly items with nutrition per unit and quantity:\n{table}\n\n\
Task:\n\
Return JSON with:\n\
- target_nutrients: list of strings\n\
- gaps: list of strings\n\
- recommendations: list of up to five items available in city with a short why\n\
\n\
Return only valid JSON, no markdown formatting."
    )
}

fn default_targets() -> Vec<String> {
    DEFAULT_TARGETS.iter().map(|t| t.to_string()).collect()
}

/// General advice used when the LLM cannot be consulted.
pub fn fallback_advice(totals: Nutrients) -> NutritionAdvice {
    NutritionAdvice {
        target_nutrients: default_targets(),
        gaps: vec![
            "Your current intake may be low in some essential nutrients. Consider adding more variety."
                .to_string(),
        ],
        recommendations: GENERAL_RECOMMENDATIONS
            .iter()
            .map(|(item, why)| Recommendation {
                item: item.to_string(),
                why: why.to_string(),
            })
            .collect(),
        weekly_totals: totals,
    }
}

/// Advice read off a prose reply that carried no JSON.
fn keyword_advice(reply: &str, totals: Nutrients) -> NutritionAdvice {
    let lower = reply.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let gap = if mentions(&["low", "deficient", "lacking"]) {
        "Some nutrients may be below recommended levels based on your current intake"
    } else {
        "Consider adding more variety to your weekly produce selection"
    };
    let mut recommendations = Vec::new();
    if mentions(&["recommend", "suggest"]) {
        recommendations.push(Recommendation {
            item: "Consult the full analysis for specific recommendations".to_string(),
            why: "AI analysis suggests adding more variety to meet nutritional goals".to_string(),
        });
    }

    NutritionAdvice {
        target_nutrients: default_targets(),
        gaps: vec![gap.to_string()],
        recommendations,
        weekly_totals: totals,
    }
}

#[derive(Debug, Deserialize)]
struct LlmAdvice {
    target_nutrients: Option<Vec<String>>,
    gaps: Option<Vec<String>>,
    recommendations: Option<Vec<Recommendation>>,
}

fn parse_reply(reply: &str, totals: Nutrients) -> NutritionAdvice {
    let Some(json) = first_json_object(reply) else {
        warn!("nutrition reply had no JSON, reading keywords");
        return keyword_advice(reply, totals);
    };
    match serde_json::from_str::<LlmAdvice>(json) {
        Ok(parsed) => NutritionAdvice {
            target_nutrients: parsed.target_nutrients.unwrap_or_default(),
            gaps: parsed.gaps.unwrap_or_default(),
            recommendations: parsed.recommendations.unwrap_or_default(),
            weekly_totals: totals,
        },
        Err(e) => {
            warn!(error = %e, "nutrition reply JSON did not parse, using general advice");
            fallback_advice(totals)
        }
    }
}

/// Validate, total the week, and ask the LLM for gaps and recommendations.
pub async fn advise(
    generator: &dyn TextGenerator,
    catalog: &Catalog,
    request: &NutritionRequest,
) -> Result<NutritionAdvice, InvalidInput> {
    validate(request)?;
    let summary = summarize(catalog, &request.weekly_items);
    let allergies = request
        .allergies
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("None");

    match generator
        .generate(&user_prompt(allergies, &summary.table), SYSTEM_PROMPT)
        .await
    {
        Ok(reply) => Ok(parse_reply(&reply, summary.totals)),
        Err(e) => {
            warn!(error = %e, "nutrition advice generation failed, using general advice");
            Ok(fallback_advice(summary.totals))
        }
    }
}
