use super::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a snapshot's level reading came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnapshotSource {
    InitialCreation,
    InventoryUpdate,
    External(String),
}

impl SnapshotSource {
    pub fn as_str(&self) -> &str {
        match self {
            SnapshotSource::InitialCreation => "initial_creation",
            SnapshotSource::InventoryUpdate => "inventory_update",
            SnapshotSource::External(tag) => tag,
        }
    }
}

/// An immutable, append-only record of an item's level at a point in time.
///
/// `seq` is the per-item monotonic insertion sequence used to break ties
/// between snapshots recorded at the same millisecond (§3, §4.1, §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryLevelSnapshot {
    pub item_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
    pub level: f64,
    pub unit_id: Uuid,
    pub source: SnapshotSource,
    pub context: String,
    pub metadata: Metadata,
}
