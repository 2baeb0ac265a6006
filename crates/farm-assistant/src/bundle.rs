/// Product catalog and weekly bundles for Basic-plan subscribers.
///
/// A bundle is five in-stock products from the subscriber's city, one of each. Selection is
/// a seeded shuffle: the same catalog and seed always yield the same bundle, and the default
/// seed is the current week so a city's bundle holds steady until the week rolls over.
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::corpus::load_json;
use crate::error::AppError;
use crate::model::Product;
use farm_common::api::BundleItem;

pub const BUNDLE_SIZE: usize = 5;

const SECS_PER_WEEK: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn from_products(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let products: Vec<Product> = load_json(path)?;
        info!(path = %path.display(), products = products.len(), "product catalog loaded");
        Ok(Self { products })
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Pick this week's bundle for `city_id`.
    pub fn weekly_bundle(&self, city_id: &str, seed: u64) -> Vec<BundleItem> {
        let mut candidates: Vec<&Product> = self
            .products
            .iter()
            .filter(|p| p.city_id == city_id && p.available && p.quantity > 0)
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        candidates.shuffle(&mut rng);

        candidates
            .into_iter()
            .take(BUNDLE_SIZE)
            .map(|p| BundleItem {
                id: p.id.clone(),
                name: p.name.clone(),
                quantity: 1,
                unit: p.unit.clone(),
                price: p.price,
                farm_id: p.farm_id.clone(),
            })
            .collect()
    }
}

/// Whole weeks since the Unix epoch.
pub fn current_week_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
        / SECS_PER_WEEK
}
