//! Per-(item, model) predictor registry (§9 "Per-item per-model registry").

use crate::domain::PredictionModelConfig;
use crate::predict::{Predictor, PredictorHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const SHARD_COUNT: usize = 16;

/// One predictor instance guarded by its own mutex — the per-predictor
/// serialization of `Update`/`Predict` the service is responsible for
/// providing (§5).
pub struct PredictorSlot {
    inner: Mutex<PredictorHandle>,
}

impl PredictorSlot {
    fn new(model: &PredictionModelConfig) -> Self {
        Self {
            inner: Mutex::new(PredictorHandle::new(model)),
        }
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn Predictor) -> R) -> R {
        let mut guard = self.inner.lock();
        f(guard.as_predictor_mut())
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn Predictor) -> R) -> R {
        let guard = self.inner.lock();
        f(guard.as_predictor())
    }

    /// Raw lock access for callers (the ensemble combiner) that need to
    /// hold several slots' guards open at once.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, PredictorHandle> {
        self.inner.lock()
    }
}

/// The process-wide `(item_id, model_family) -> predictor` map (§9), sharded
/// by a hash of `item_id` to keep lock contention local to a slice of items
/// rather than the whole registry.
pub struct PredictorRegistry {
    shards: Vec<RwLock<HashMap<(Uuid, &'static str), Arc<PredictorSlot>>>>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(
        &self,
        item_id: Uuid,
    ) -> &RwLock<HashMap<(Uuid, &'static str), Arc<PredictorSlot>>> {
        let hash = item_id
            .as_bytes()
            .iter()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64));
        &self.shards[(hash as usize) % SHARD_COUNT]
    }

    /// Returns the slot for `(item_id, model)`, constructing and inserting a
    /// fresh predictor on first access.
    pub fn get_or_create(
        &self,
        item_id: Uuid,
        model: &PredictionModelConfig,
    ) -> Arc<PredictorSlot> {
        let family = model.family();
        let shard = self.shard_for(item_id);

        if let Some(slot) = shard.read().get(&(item_id, family)) {
            return slot.clone();
        }
        shard
            .write()
            .entry((item_id, family))
            .or_insert_with(|| Arc::new(PredictorSlot::new(model)))
            .clone()
    }

    pub fn get(&self, item_id: Uuid, family: &str) -> Option<Arc<PredictorSlot>> {
        self.shard_for(item_id).read().get(&(item_id, family)).cloned()
    }

    /// Every predictor slot registered for `item_id`, across model
    /// families — the input set to `GetEnsemblePrediction` (§4.5).
    pub fn all_for_item(&self, item_id: Uuid) -> Vec<Arc<PredictorSlot>> {
        self.shard_for(item_id)
            .read()
            .iter()
            .filter(|((id, _), _)| *id == item_id)
            .map(|(_, slot)| slot.clone())
            .collect()
    }

    /// Drops every predictor for `item_id` — called on `RemoveInventoryItem`
    /// so a deleted item's in-memory state doesn't linger indefinitely.
    pub fn remove_item(&self, item_id: Uuid) {
        self.shard_for(item_id).write().retain(|(id, _), _| *id != item_id);
    }
}

impl Default for PredictorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = PredictorRegistry::new();
        let item_id = Uuid::new_v4();
        let model = PredictionModelConfig::Markov;

        let a = registry.get_or_create(item_id, &model);
        let b = registry.get_or_create(item_id, &model);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn all_for_item_spans_families() {
        let registry = PredictorRegistry::new();
        let item_id = Uuid::new_v4();

        registry.get_or_create(item_id, &PredictionModelConfig::Markov);
        registry.get_or_create(item_id, &PredictionModelConfig::Croston);
        registry.get_or_create(item_id, &PredictionModelConfig::Bayesian);

        assert_eq!(registry.all_for_item(item_id).len(), 3);
    }

    #[test]
    fn remove_item_clears_its_slots() {
        let registry = PredictorRegistry::new();
        let item_id = Uuid::new_v4();
        registry.get_or_create(item_id, &PredictionModelConfig::Markov);
        registry.remove_item(item_id);
        assert!(registry.all_for_item(item_id).is_empty());
    }
}
