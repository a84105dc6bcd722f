use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-write-wins descriptive summary of how an item tends to get consumed.
/// `seasonal_factors` is fixed at 12 entries (one per calendar month).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionBehavior {
    pub pattern: String,
    pub average_rate_per_day: f64,
    pub variance: f64,
    pub seasonal_factors: [f64; 12],
    pub last_updated: DateTime<Utc>,
}

impl ConsumptionBehavior {
    pub fn new(pattern: impl Into<String>, average_rate_per_day: f64, variance: f64) -> Self {
        Self {
            pattern: pattern.into(),
            average_rate_per_day,
            variance,
            seasonal_factors: [1.0; 12],
            last_updated: Utc::now(),
        }
    }
}
