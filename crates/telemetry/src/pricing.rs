//! Per-model pricing, keyed by catalog model id.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price, seeded from the catalog's `price_in`/`price_out`.

use modelrelay_core::catalog::Catalog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }

    pub fn is_free(&self) -> bool {
        self.input_per_m == 0.0 && self.output_per_m == 0.0
    }
}

/// Thread-safe pricing table.
#[derive(Debug, Default)]
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed prices from every catalog model that declares one.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let prices = catalog
            .models()
            .map(|m| (m.id.clone(), ModelPricing::new(m.price_in, m.price_out)))
            .filter(|(_, p)| !p.is_free())
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model_id: &str) -> Option<ModelPricing> {
        self.prices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_id)
            .copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model_id: impl Into<String>, pricing: ModelPricing) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model_id.into(), pricing);
    }

    /// Compute cost for a model call, returning 0.0 if the model is unpriced.
    pub fn compute_cost(&self, model_id: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.get(model_id)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// List all priced model ids, sorted.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.prices.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
