//! Inventory Service facade (§4.6): validation, orchestration, event
//! emission, error translation. The only thing callers (transport,
//! integration tests) talk to.

use crate::cancel::CancellationToken;
use crate::domain::{
    ConsumptionBehavior, InventoryItem, InventoryLevelSnapshot, Metadata, ParametricKind,
    PredictionModelConfig, SnapshotSource, Unit,
};
use crate::error::{Error, Result};
use crate::events::{EventSink, InventoryEvent, InventoryItemRemoved, InventoryLevelChanged};
use crate::fitness::{self, FitnessSnapshot, FitnessTracker};
use crate::history::HistoryQuery;
use crate::predict::{ConsumptionReport, Estimate, Predictor, PredictorHandle};
use crate::registry::PredictorRegistry;
use crate::store::{ItemFilters, ItemPage, Repository, UnitFilters, UnitPage};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// `GetItemHistory`'s response (§4.6): the history-engine result plus the
/// item's earliest/latest snapshot timestamps.
#[derive(Debug, Clone)]
pub struct ItemHistory {
    pub snapshots: Vec<InventoryLevelSnapshot>,
    pub total_count: usize,
    pub more_data_available: bool,
    pub earliest_timestamp: Option<DateTime<Utc>>,
    pub latest_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UpdateLevelResult {
    pub item: InventoryItem,
    pub below_threshold: bool,
}

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub estimate: Estimate,
    pub days_remaining: Option<f64>,
    pub empty_date: Option<DateTime<Utc>>,
    pub recommended_restock_level: f64,
}

#[derive(Debug, Clone)]
pub struct SetActiveModelResult {
    pub item: InventoryItem,
    pub model_changed: bool,
}

#[derive(Debug, Clone)]
pub struct ActiveModelResult {
    pub model: PredictionModelConfig,
    pub has_active_model: bool,
}

/// Optional field updates for `UpdateInventoryItem` (§6).
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_capacity: Option<f64>,
    pub low_stock_threshold: Option<f64>,
    pub metadata: Option<Metadata>,
    pub consumption_behavior: Option<ConsumptionBehavior>,
}

pub struct InventoryService {
    repo: Repository,
    registry: PredictorRegistry,
    fitness: FitnessTracker,
    events: Arc<dyn EventSink>,
}

impl InventoryService {
    pub fn new(repo: Repository, events: Arc<dyn EventSink>) -> Self {
        Self {
            repo,
            registry: PredictorRegistry::new(),
            fitness: FitnessTracker::new(),
            events,
        }
    }

    // ---- Items ------------------------------------------------------

    pub fn add_inventory_item(
        &self,
        name: impl Into<String>,
        unit_id: Uuid,
        initial_level: f64,
        max_capacity: f64,
        low_stock_threshold: f64,
        metadata: Option<Metadata>,
    ) -> Result<InventoryItem> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("name must not be empty".into()));
        }
        if initial_level < 0.0 {
            return Err(Error::InvalidArgument("initial_level must be non-negative".into()));
        }
        if max_capacity <= 0.0 {
            return Err(Error::InvalidArgument("max_capacity must be positive".into()));
        }
        if low_stock_threshold < 0.0 {
            return Err(Error::InvalidArgument(
                "low_stock_threshold must be non-negative".into(),
            ));
        }

        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4(),
            name,
            description: String::new(),
            current_level: initial_level,
            max_capacity,
            low_stock_threshold,
            primary_unit_id: unit_id,
            alternate_unit_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: metadata.unwrap_or_default(),
            active_prediction_model: None,
            consumption_behavior: None,
        };

        let mut creation_metadata = HashMap::new();
        creation_metadata.insert("created_by".to_string(), "system".to_string());

        let (stored, _snapshot) = self.repo.add_item(item, "initial_creation", creation_metadata)?;
        Ok(stored)
    }

    pub fn get_inventory_item(&self, item_id: Uuid) -> Result<InventoryItem> {
        self.require_id(item_id)?;
        self.repo.get_item(item_id)
    }

    pub fn list_inventory_items(&self, filters: ItemFilters) -> Result<ItemPage> {
        self.repo.list_items(&filters)
    }

    /// `UpdateInventoryItem` (§6): applies the given field updates, leaving
    /// unspecified fields untouched. Never touches `current_level` — that is
    /// `UpdateInventoryLevel`'s job, the only path that also appends a
    /// snapshot.
    pub fn update_inventory_item(
        &self,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> Result<(InventoryItem, bool)> {
        self.require_id(item_id)?;
        let mut item = self.repo.get_item(item_id)?;
        let before = item.clone();

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidArgument("name must not be empty".into()));
            }
            item.name = name;
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        if let Some(max_capacity) = update.max_capacity {
            if max_capacity <= 0.0 {
                return Err(Error::InvalidArgument("max_capacity must be positive".into()));
            }
            item.max_capacity = max_capacity;
        }
        if let Some(low_stock_threshold) = update.low_stock_threshold {
            if low_stock_threshold < 0.0 {
                return Err(Error::InvalidArgument(
                    "low_stock_threshold must be non-negative".into(),
                ));
            }
            item.low_stock_threshold = low_stock_threshold;
        }
        if let Some(metadata) = update.metadata {
            item.metadata = metadata;
        }
        if let Some(behavior) = update.consumption_behavior {
            item.consumption_behavior = Some(behavior);
        }

        let changed = item != before;
        if changed {
            item.updated_at = Utc::now();
            self.repo.update_item(&item)?;
        }
        Ok((item, changed))
    }

    /// `RemoveInventoryItem` (§6): hard-deletes the item and its snapshots,
    /// drops its in-memory predictor state, and fires `InventoryItemRemoved`
    /// best-effort.
    pub fn remove_inventory_item(&self, item_id: Uuid) -> Result<(Uuid, String)> {
        self.require_id(item_id)?;
        let item = self.repo.get_item(item_id)?;
        self.repo.delete_item(item_id)?;
        self.registry.remove_item(item_id);

        self.events.publish(InventoryEvent::ItemRemoved(InventoryItemRemoved {
            item_id,
            name: item.name.clone(),
        }));

        Ok((item_id, item.name))
    }

    /// `UpdateInventoryLevel` (§4.6, §8 P2): writes the new level and its
    /// snapshot in one transaction (the §9 Open Question on soft-failing the
    /// snapshot write is resolved strict — see DESIGN.md), then fires
    /// `InventoryLevelChanged` best-effort and optionally feeds the item's
    /// active predictor.
    pub fn update_inventory_level(
        &self,
        item_id: Uuid,
        new_level: f64,
        reason: impl Into<String>,
        record_consumption: bool,
    ) -> Result<UpdateLevelResult> {
        self.require_id(item_id)?;
        if new_level < 0.0 {
            return Err(Error::InvalidArgument("new_level must be non-negative".into()));
        }
        let reason = reason.into();

        let mut item = self.repo.get_item(item_id)?;
        let previous_level = item.current_level;
        let now = Utc::now();

        item.current_level = new_level;
        item.updated_at = now;

        // §3's "synthesized and persisted" default only needs to land here
        // when this call is actually going to read the model (to feed a
        // predictor); it rides along in the same atomic item+snapshot write
        // below rather than requiring a second transaction.
        let consumption_model = record_consumption.then(|| item.ensure_active_prediction_model());

        let mut snapshot_metadata = HashMap::new();
        snapshot_metadata.insert("previous_level".to_string(), previous_level.to_string());
        snapshot_metadata.insert(
            "change_amount".to_string(),
            (new_level - previous_level).to_string(),
        );

        let seq = self.repo.next_snapshot_seq()?;
        let snapshot = InventoryLevelSnapshot {
            item_id,
            timestamp: now,
            seq,
            level: new_level,
            unit_id: item.primary_unit_id,
            source: SnapshotSource::InventoryUpdate,
            context: reason,
            metadata: snapshot_metadata,
        };

        self.repo.update_item_with_snapshot(&item, &snapshot)?;

        let below_threshold =
            new_level <= item.low_stock_threshold && previous_level > item.low_stock_threshold;

        self.events.publish(InventoryEvent::LevelChanged(InventoryLevelChanged {
            item_id,
            name: item.name.clone(),
            previous_level,
            new_level,
            unit_id: item.primary_unit_id,
            low_stock_threshold: item.low_stock_threshold,
        }));

        if let Some(model) = consumption_model {
            let slot = self.registry.get_or_create(item_id, &model);
            let report = ConsumptionReport {
                item_id,
                timestamp: now,
                level: new_level,
                context: "update_inventory_level".into(),
                metadata: HashMap::new(),
            };
            slot.with_mut(|p| p.update(&report));
        }

        Ok(UpdateLevelResult {
            item,
            below_threshold,
        })
    }

    // ---- History ------------------------------------------------------

    pub fn get_item_history(
        &self,
        item_id: Uuid,
        query: HistoryQuery,
        cancel: &CancellationToken,
    ) -> Result<ItemHistory> {
        self.require_id(item_id)?;
        let result = self.repo.get_inventory_history(item_id, query, cancel)?;
        let earliest_timestamp = self.repo.get_earliest_snapshot(item_id)?.map(|s| s.timestamp);
        let latest_timestamp = self.repo.get_latest_snapshot(item_id)?.map(|s| s.timestamp);

        Ok(ItemHistory {
            snapshots: result.snapshots,
            total_count: result.total_count,
            more_data_available: result.more_data_available,
            earliest_timestamp,
            latest_timestamp,
        })
    }

    // ---- Prediction -----------------------------------------------------

    /// `PredictConsumption` (§4.6, §8 scenarios 4/5). A `Parametric` active
    /// model is already a fitted closed-form curve, so it is seeded and used
    /// directly; any other family is freshly constructed and fed a single
    /// current-state observation, so it reports its honest "collecting
    /// data" estimate until enough real `Update` calls accumulate via
    /// `UpdateInventoryLevel(..., record_consumption=true)`.
    pub fn predict_consumption(&self, item_id: Uuid, days_ahead: f64) -> Result<PredictionResult> {
        self.require_id(item_id)?;
        if !(days_ahead > 0.0) {
            return Err(Error::InvalidArgument("days_ahead must be positive".into()));
        }

        let mut item = self.repo.get_item(item_id)?;
        let had_explicit_model = item.active_prediction_model.is_some();
        let model = item.ensure_active_prediction_model();
        if !had_explicit_model {
            item.updated_at = Utc::now();
            self.repo.update_item(&item)?;
        }
        let now = Utc::now();
        let target_time = now + Duration::seconds((days_ahead * 86_400.0) as i64);

        let estimate = match &model {
            PredictionModelConfig::Parametric(kind) => {
                crate::predict::ParametricPredictor::seeded(*kind).predict(target_time)
            }
            _ => {
                let mut handle = PredictorHandle::new(&model);
                let report = ConsumptionReport {
                    item_id,
                    timestamp: now,
                    level: item.current_level,
                    context: "predict_consumption".into(),
                    metadata: HashMap::new(),
                };
                handle.as_predictor_mut().update(&report);
                handle.as_predictor().predict(target_time)
            }
        };

        let days_remaining = if estimate.point <= 0.0 {
            Some(0.0)
        } else if item.current_level > 0.0 && estimate.point < item.current_level {
            let consumed = item.current_level - estimate.point;
            Some(days_ahead * item.current_level / consumed)
        } else {
            None
        };
        let empty_date =
            days_remaining.map(|days| now + Duration::seconds((days * 86_400.0) as i64));

        let recommended_restock_level = item
            .max_capacity
            .min((0.8 * item.max_capacity).max(2.0 * item.low_stock_threshold));

        Ok(PredictionResult {
            estimate,
            days_remaining,
            empty_date,
            recommended_restock_level,
        })
    }

    /// `GetEnsemblePrediction` (§4.5, P8): combines every registered,
    /// eligible predictor for `item_id` — populated over time by
    /// `UpdateInventoryLevel(..., record_consumption=true)` calls, not by
    /// this method itself.
    pub fn get_ensemble_prediction(&self, item_id: Uuid, target_time: DateTime<Utc>) -> Result<Estimate> {
        self.require_id(item_id)?;
        let slots = self.registry.all_for_item(item_id);
        let guards: Vec<_> = slots.iter().map(|s| s.lock()).collect();
        let predictors: Vec<&dyn Predictor> = guards.iter().map(|g| g.as_predictor()).collect();
        fitness::ensemble_predict(&predictors, target_time)
    }

    pub fn set_active_prediction_model(
        &self,
        item_id: Uuid,
        model: PredictionModelConfig,
    ) -> Result<SetActiveModelResult> {
        self.require_id(item_id)?;
        let mut item = self.repo.get_item(item_id)?;
        let model_changed = item.effective_prediction_model() != model;

        item.active_prediction_model = Some(model);
        item.updated_at = Utc::now();
        self.repo.update_item(&item)?;

        Ok(SetActiveModelResult { item, model_changed })
    }

    /// `GetActivePredictionModel` (§3, §6): synthesizes and persists the
    /// default model on first access, per §3's lifecycle rule.
    pub fn get_active_prediction_model(&self, item_id: Uuid) -> Result<ActiveModelResult> {
        self.require_id(item_id)?;
        let mut item = self.repo.get_item(item_id)?;
        let has_active_model = item.active_prediction_model.is_some();

        let model = item.ensure_active_prediction_model();
        if !has_active_model {
            item.updated_at = Utc::now();
            self.repo.update_item(&item)?;
        }

        Ok(ActiveModelResult { model, has_active_model })
    }

    /// Records a prediction-vs-actual outcome against the fitness tracker.
    /// Not an RPC in its own right (§6) — it's the hook callers use to feed
    /// ground truth back in once it's known, driving `current_fitness` and
    /// `best_model`'s model auto-selection (§4.5).
    pub fn record_fitness_outcome(
        &self,
        item_id: Uuid,
        model_family: &'static str,
        actual: f64,
        predicted: f64,
    ) -> FitnessSnapshot {
        self.fitness
            .update_fitness(item_id, model_family, actual, predicted, Utc::now())
    }

    pub fn current_fitness(&self, item_id: Uuid, model_family: &str) -> Option<FitnessSnapshot> {
        self.fitness.current_fitness(item_id, model_family)
    }

    /// Recommended-model selection (§4.5): `AutoSelectBest` picks the
    /// enabled family with the highest `current_fitness`; otherwise the
    /// caller's preferred family is returned as-is if enabled.
    pub fn recommended_model(
        &self,
        item_id: Uuid,
        auto_select_best: bool,
        preferred: Option<&'static str>,
        enabled: &[&'static str],
    ) -> Option<&'static str> {
        if auto_select_best {
            self.fitness.best_model(item_id, enabled)
        } else {
            preferred.filter(|p| enabled.contains(p))
        }
    }

    // ---- Units ------------------------------------------------------

    pub fn add_unit(
        &self,
        name: impl Into<String>,
        symbol: impl Into<String>,
        base_conversion_factor: f64,
        category: impl Into<String>,
    ) -> Result<Unit> {
        let name = name.into();
        let symbol = symbol.into();
        if name.trim().is_empty() || symbol.trim().is_empty() {
            return Err(Error::InvalidArgument("unit name and symbol must not be empty".into()));
        }
        if base_conversion_factor <= 0.0 {
            return Err(Error::InvalidArgument(
                "base_conversion_factor must be positive".into(),
            ));
        }

        let now = Utc::now();
        self.repo.add_unit(Unit {
            id: Uuid::new_v4(),
            name,
            symbol,
            description: String::new(),
            base_conversion_factor,
            category: category.into(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        })
    }

    pub fn get_unit(&self, unit_id: Uuid) -> Result<Unit> {
        self.require_id(unit_id)?;
        self.repo.get_unit(unit_id)
    }

    pub fn list_units(&self, filters: UnitFilters) -> Result<UnitPage> {
        self.repo.list_units(&filters)
    }

    pub fn remove_unit(&self, unit_id: Uuid, force: bool) -> Result<()> {
        self.require_id(unit_id)?;
        self.repo.delete_unit(unit_id, force)
    }

    fn require_id(&self, id: Uuid) -> Result<()> {
        if id.is_nil() {
            warn!("rejected request with nil id");
            return Err(Error::InvalidArgument("id must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::history::HistoryQuery;

    fn service() -> (InventoryService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        (InventoryService::new(repo, Arc::new(NullEventSink)), dir)
    }

    #[test]
    fn scenario_1_initial_history() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 100.0, 200.0, 20.0, None)
            .unwrap();

        let history = svc
            .get_item_history(
                item.id,
                HistoryQuery::CountBased { count: 10 },
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(history.snapshots.len(), 1);
        assert_eq!(history.snapshots[0].level, 100.0);
        assert_eq!(history.snapshots[0].source.as_str(), "initial_creation");
    }

    #[test]
    fn scenario_2_three_updates_ordered() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 100.0, 200.0, 20.0, None)
            .unwrap();

        svc.update_inventory_level(item.id, 75.0, "adj", false).unwrap();
        svc.update_inventory_level(item.id, 90.0, "restock", false).unwrap();
        svc.update_inventory_level(item.id, 50.0, "use", false).unwrap();

        let history = svc
            .get_item_history(
                item.id,
                HistoryQuery::CountBased { count: 10 },
                &CancellationToken::new(),
            )
            .unwrap();

        let levels: Vec<f64> = history.snapshots.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![50.0, 90.0, 75.0, 100.0]);
    }

    #[test]
    fn scenario_3_low_stock_crossover() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 50.0, 200.0, 20.0, None)
            .unwrap();

        let r1 = svc.update_inventory_level(item.id, 15.0, "use", false).unwrap();
        assert!(r1.below_threshold);

        let r2 = svc.update_inventory_level(item.id, 10.0, "use", false).unwrap();
        assert!(r2.below_threshold);

        let r3 = svc.update_inventory_level(item.id, 25.0, "restock", false).unwrap();
        assert!(!r3.below_threshold);
    }

    #[test]
    fn scenario_4_linear_prediction() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 100.0, 200.0, 20.0, None)
            .unwrap();

        svc.set_active_prediction_model(
            item.id,
            PredictionModelConfig::Parametric(ParametricKind::Linear {
                slope: -5.0,
                base: 100.0,
                noise: 0.5,
            }),
        )
        .unwrap();

        let prediction = svc.predict_consumption(item.id, 7.0).unwrap();
        assert!((prediction.estimate.point - 65.0).abs() < 1e-6);
        assert!(0.0 <= prediction.estimate.lower_bound);
        assert!(prediction.estimate.lower_bound <= prediction.estimate.point);
        assert!(prediction.estimate.point <= prediction.estimate.upper_bound);
    }

    #[test]
    fn scenario_5_logistic_bounded() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 50.0, 200.0, 20.0, None)
            .unwrap();

        svc.set_active_prediction_model(
            item.id,
            PredictionModelConfig::Parametric(ParametricKind::Logistic {
                r: 0.1,
                k: 100.0,
                p0: 50.0,
            }),
        )
        .unwrap();

        let prediction = svc.predict_consumption(item.id, 10.0).unwrap();
        assert!(prediction.estimate.point > 50.0 && prediction.estimate.point <= 100.0);
    }

    #[test]
    fn scenario_6_unit_in_use() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        svc.add_inventory_item("A", unit.id, 10.0, 200.0, 20.0, None).unwrap();

        let err = svc.remove_unit(unit.id, false).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));

        svc.remove_unit(unit.id, true).unwrap();
        assert!(matches!(svc.get_unit(unit.id).unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn add_inventory_item_rejects_empty_name() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let err = svc
            .add_inventory_item("  ", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn predict_consumption_rejects_non_positive_days_ahead() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap();
        let err = svc.predict_consumption(item.id, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn get_active_prediction_model_persists_default_on_first_access() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap();

        let first = svc.get_active_prediction_model(item.id).unwrap();
        assert!(!first.has_active_model);

        let second = svc.get_active_prediction_model(item.id).unwrap();
        assert!(second.has_active_model);
        assert_eq!(first.model, second.model);
    }

    #[test]
    fn predict_consumption_persists_default_model_on_first_access() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap();
        assert!(svc.get_inventory_item(item.id).unwrap().active_prediction_model.is_none());

        svc.predict_consumption(item.id, 1.0).unwrap();

        let reloaded = svc.get_inventory_item(item.id).unwrap();
        assert_eq!(
            reloaded.active_prediction_model,
            Some(InventoryItem::default_prediction_model())
        );
    }

    #[test]
    fn update_inventory_level_persists_default_model_when_recording_consumption() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap();
        assert!(svc.get_inventory_item(item.id).unwrap().active_prediction_model.is_none());

        svc.update_inventory_level(item.id, 8.0, "use", true).unwrap();

        let reloaded = svc.get_inventory_item(item.id).unwrap();
        assert_eq!(
            reloaded.active_prediction_model,
            Some(InventoryItem::default_prediction_model())
        );
    }

    #[test]
    fn update_inventory_level_leaves_model_unset_without_record_consumption() {
        let (svc, _dir) = service();
        let unit = svc.add_unit("kilogram", "kg", 1.0, "mass").unwrap();
        let item = svc
            .add_inventory_item("A", unit.id, 10.0, 100.0, 5.0, None)
            .unwrap();

        svc.update_inventory_level(item.id, 8.0, "use", false).unwrap();

        let reloaded = svc.get_inventory_item(item.id).unwrap();
        assert!(reloaded.active_prediction_model.is_none());
    }
}
