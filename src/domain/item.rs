use super::{ConsumptionBehavior, Metadata, PredictionModelConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked inventory item.
///
/// `current_level <= max_capacity` is deliberately **not** enforced (§3) —
/// overfills are recorded as-is rather than rejected, since the store's job
/// is to record reality, not to police it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub current_level: f64,
    pub max_capacity: f64,
    pub low_stock_threshold: f64,
    pub primary_unit_id: Uuid,
    pub alternate_unit_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Metadata,
    pub active_prediction_model: Option<PredictionModelConfig>,
    pub consumption_behavior: Option<ConsumptionBehavior>,
}

impl InventoryItem {
    /// The default model synthesized on first access when none is set (§3).
    pub fn default_prediction_model() -> PredictionModelConfig {
        PredictionModelConfig::Parametric(super::ParametricKind::Linear {
            slope: -1.0,
            base: 10.0,
            noise: 0.5,
        })
    }

    /// Reads the active model, synthesizing (but not persisting) the default
    /// if absent. Pure and `&self` — callers on a path that must honor §3's
    /// "synthesized and persisted" rule need `ensure_active_prediction_model`
    /// instead, then write the item back through the repository themselves.
    pub fn effective_prediction_model(&self) -> PredictionModelConfig {
        self.active_prediction_model
            .clone()
            .unwrap_or_else(Self::default_prediction_model)
    }

    /// Sets `active_prediction_model` to the default if absent and returns
    /// the effective model either way (§3: "on first access ... a default
    /// ... is synthesized and persisted"). This only mutates the in-memory
    /// field — the caller still owns persisting `self` through the
    /// repository, since this type has no repository handle of its own.
    pub fn ensure_active_prediction_model(&mut self) -> PredictionModelConfig {
        if self.active_prediction_model.is_none() {
            self.active_prediction_model = Some(Self::default_prediction_model());
        }
        self.active_prediction_model.clone().unwrap()
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_level <= self.low_stock_threshold
    }

    pub fn references_unit(&self, unit_id: Uuid) -> bool {
        self.primary_unit_id == unit_id || self.alternate_unit_ids.contains(&unit_id)
    }
}
