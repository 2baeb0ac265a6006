use serde::{Deserialize, Deserializer, Serialize};

use farm_common::api::Nutrients;

/// A short passage of Farm2Table knowledge used to ground assistant answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Unique document id, e.g. "nyc-delivery-days"
    pub id: String,
    /// City scope. `None` means the document applies to every city.
    #[serde(default, deserialize_with = "non_empty_city")]
    pub city: Option<String>,
    /// Short label, also used as the citation key in prompts
    pub title: String,
    /// Passage content injected into prompts
    pub text: String,
    /// Pre-computed embedding; empty when not yet computed
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl KnowledgeDocument {
    /// True when the document is visible for `city_id`: same city, or city-agnostic.
    /// A blank city counts as agnostic whether or not it came through deserialization.
    pub fn applies_to(&self, city_id: &str) -> bool {
        match self.city.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(city) => city == city_id,
        }
    }
}

/// Missing, null, empty and whitespace-only cities all mean "every city".
fn non_empty_city<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|c| !c.trim().is_empty()))
}

/// A candidate document paired with its relevance to the current query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredDocument<'a> {
    pub doc: &'a KnowledgeDocument,
    /// Cosine similarity in [-1, 1], or the 0.5 fallback when no vectors are comparable
    pub similarity: f32,
}

/// A sellable item from a partner farm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub farm_id: String,
    pub city_id: String,
    pub name: String,
    pub unit: String,
    pub price: f64,
    pub quantity: u32,
    pub available: bool,
    /// Per-unit nutrition facts. Products without them count as zero.
    #[serde(default)]
    pub nutrition: Nutrients,
}
