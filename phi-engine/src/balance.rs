//! Balance Aggregator
//!
//! Combines four category metrics into normalized shares and a single balance
//! score measuring how evenly the weighted allocation is spread.
//!
//! # Algorithm
//! 1. `weighted_i = raw_i × weight_i`, `total = Σ weighted_i`. Raw values
//!    and weights are first divided by their respective maxima, so every
//!    product is at most 1 and the shares are unchanged
//! 2. `total = 0` → every share 0, balance 0 (degenerate, not an error)
//! 3. `share_i = weighted_i / total`
//! 4. `balance = 1 − Σ|share_i − 0.25| / (2 × 0.75)`
//!
//! The normalization constant is the largest possible deviation sum (all
//! weight in one category), so balance is 1.0 for a perfectly even split and
//! 0.0 for full concentration.

use phi_common::config::BalanceConfig;
use phi_common::events::{EventBus, PipelineEvent};
use phi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Share each category would hold under a perfectly even allocation
pub const IDEAL_SHARE: f64 = 1.0 / Category::COUNT as f64;

/// Largest possible Σ|share − ideal|, reached when one category holds everything
const MAX_DEVIATION: f64 = 2.0 * (1.0 - IDEAL_SHARE);

/// The four fixed balance categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fire,
    Water,
    Air,
    Earth,
}

impl Category {
    pub const COUNT: usize = 4;

    /// All categories, in tie-break order
    pub const ALL: [Category; Category::COUNT] =
        [Category::Fire, Category::Water, Category::Air, Category::Earth];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fire => "fire",
            Category::Water => "water",
            Category::Air => "air",
            Category::Earth => "earth",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category's raw measurement and weight for an aggregation cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetric {
    pub category: Category,
    /// Must be finite and ≥ 0
    pub raw_value: f64,
    /// Must be finite and > 0
    pub weight: f64,
}

impl CategoryMetric {
    pub fn new(category: Category, raw_value: f64, weight: f64) -> Self {
        Self {
            category,
            raw_value,
            weight,
        }
    }
}

/// Metric as supplied by a caller; a missing weight falls back to the
/// aggregator's configured weight for that category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricInput {
    pub category: Category,
    pub raw_value: f64,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Output of one aggregation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    /// Share per category; sums to 1, or all zero when nothing was allocated
    pub per_category: BTreeMap<Category, f64>,
    /// Evenness in [0, 1]
    pub balance_score: f64,
    /// Category with the largest share (None when nothing was allocated)
    pub dominant: Option<Category>,
}

/// Balance aggregator
#[derive(Debug, Clone, Default)]
pub struct BalanceAggregator {
    weights: BalanceConfig,
    event_bus: Option<EventBus>,
}

impl BalanceAggregator {
    /// Create an aggregator with configured category weights
    ///
    /// # Errors
    /// Configuration error if any weight is not strictly positive
    pub fn new(weights: BalanceConfig) -> Result<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            event_bus: None,
        })
    }

    /// Publish a `BalanceComputed` event after every successful cycle
    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Configured weight for `category`
    pub fn weight_of(&self, category: Category) -> f64 {
        match category {
            Category::Fire => self.weights.fire,
            Category::Water => self.weights.water,
            Category::Air => self.weights.air,
            Category::Earth => self.weights.earth,
        }
    }

    /// Build the four metrics from raw values using the configured weights
    pub fn metrics_from_raw(&self, fire: f64, water: f64, air: f64, earth: f64) -> Vec<CategoryMetric> {
        Category::ALL
            .into_iter()
            .zip([fire, water, air, earth])
            .map(|(category, raw)| CategoryMetric::new(category, raw, self.weight_of(category)))
            .collect()
    }

    /// Fill in configured weights for inputs that carry none
    pub fn resolve_metrics(&self, inputs: &[MetricInput]) -> Vec<CategoryMetric> {
        inputs
            .iter()
            .map(|m| {
                let weight = m.weight.unwrap_or_else(|| self.weight_of(m.category));
                CategoryMetric::new(m.category, m.raw_value, weight)
            })
            .collect()
    }

    /// Aggregate exactly one metric per category
    ///
    /// # Errors
    /// - `Error::Config` if a category is missing or duplicated, or a weight ≤ 0
    /// - `Error::InvalidInput` if a raw value is negative or not finite
    pub fn aggregate(&self, metrics: &[CategoryMetric]) -> Result<BalanceResult> {
        let weighted = weighted_values(validate_metrics(metrics)?);
        let total: f64 = weighted.values().sum();

        let result = if total <= 0.0 {
            debug!("All weighted category values are zero, balance is degenerate");
            BalanceResult {
                per_category: Category::ALL.into_iter().map(|c| (c, 0.0)).collect(),
                balance_score: 0.0,
                dominant: None,
            }
        } else {
            let per_category: BTreeMap<Category, f64> = weighted
                .iter()
                .map(|(category, value)| (*category, value / total))
                .collect();

            let deviation: f64 = per_category
                .values()
                .map(|share| (share - IDEAL_SHARE).abs())
                .sum();
            let balance_score = (1.0 - deviation / MAX_DEVIATION).clamp(0.0, 1.0);

            BalanceResult {
                dominant: dominant_category(&per_category),
                per_category,
                balance_score,
            }
        };

        info!(
            balance_score = result.balance_score,
            dominant = ?result.dominant,
            total,
            "Balance aggregated"
        );

        if let Some(ref bus) = self.event_bus {
            bus.emit_lossy(PipelineEvent::BalanceComputed {
                balance_score: result.balance_score,
                dominant: result.dominant.map(|c| c.to_string()),
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(result)
    }
}

/// Check the metric set and return `(raw_value, weight)` per category
fn validate_metrics(metrics: &[CategoryMetric]) -> Result<BTreeMap<Category, (f64, f64)>> {
    let mut checked = BTreeMap::new();

    for metric in metrics {
        if !metric.weight.is_finite() || metric.weight <= 0.0 {
            return Err(Error::Config(format!(
                "category '{}' weight must be > 0, got {}",
                metric.category, metric.weight
            )));
        }
        if !metric.raw_value.is_finite() || metric.raw_value < 0.0 {
            return Err(Error::InvalidInput(format!(
                "category '{}' raw value must be finite and >= 0, got {}",
                metric.category, metric.raw_value
            )));
        }
        if checked
            .insert(metric.category, (metric.raw_value, metric.weight))
            .is_some()
        {
            return Err(Error::Config(format!(
                "category '{}' supplied more than once",
                metric.category
            )));
        }
    }

    if let Some(missing) = Category::ALL.iter().find(|c| !checked.contains_key(*c)) {
        return Err(Error::Config(format!("category '{}' is missing", missing)));
    }

    Ok(checked)
}

/// Weighted value per category, scaled so that no product or sum overflows
fn weighted_values(checked: BTreeMap<Category, (f64, f64)>) -> BTreeMap<Category, f64> {
    let max_raw = checked.values().map(|(raw, _)| *raw).fold(0.0, f64::max);
    let max_weight = checked.values().map(|(_, weight)| *weight).fold(0.0, f64::max);

    checked
        .into_iter()
        .map(|(category, (raw, weight))| {
            let value = if max_raw > 0.0 {
                (raw / max_raw) * (weight / max_weight)
            } else {
                0.0
            };
            (category, value)
        })
        .collect()
}

/// Largest share; ties resolve to the earliest category in `Category::ALL`
fn dominant_category(per_category: &BTreeMap<Category, f64>) -> Option<Category> {
    let mut best: Option<(Category, f64)> = None;
    for category in Category::ALL {
        let share = per_category.get(&category).copied().unwrap_or(0.0);
        match best {
            Some((_, best_share)) if share <= best_share => {}
            _ => best = Some((category, share)),
        }
    }
    best.map(|(category, _)| category)
}
