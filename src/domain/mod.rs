//! Item / unit / snapshot data model (§3).

mod behavior;
mod item;
mod model_config;
mod snapshot;
mod unit;

pub use behavior::ConsumptionBehavior;
pub use item::InventoryItem;
pub use model_config::{ParametricKind, PredictionModelConfig, ALL_MODEL_FAMILIES};
pub use snapshot::{InventoryLevelSnapshot, SnapshotSource};
pub use unit::Unit;

use std::collections::HashMap;

/// Free-form string metadata attached to items, units and snapshots.
/// `metadata present => no nil entries` (§3) is enforced by construction:
/// this type simply never admits an `Option<String>` value.
pub type Metadata = HashMap<String, String>;
