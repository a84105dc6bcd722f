use crate::cancel::CancellationToken;
use crate::codec::{self, item_key, snapshot_key, snapshot_prefix, unit_key};
use crate::domain::{InventoryItem, InventoryLevelSnapshot, SnapshotSource, Unit};
use crate::error::{Error, Result};
use crate::history::{self, HistoryQuery, HistoryResult};
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const MAX_TXN_ATTEMPTS: u32 = 5;

/// Reasons a transaction aborts deliberately (as opposed to conflicting).
/// These are never retried — the caller's request is simply invalid.
#[derive(Debug, Clone)]
enum Abort {
    ItemAlreadyExists,
    ItemMissing,
    UnitAlreadyExists,
}

#[derive(Debug, Default, Clone)]
pub struct ItemFilters {
    pub low_stock_only: bool,
    pub unit_type_filter: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Default, Clone)]
pub struct UnitFilters {
    pub category: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct ItemPage {
    pub items: Vec<InventoryItem>,
    pub total_count: usize,
}

#[derive(Debug, Clone)]
pub struct UnitPage {
    pub units: Vec<Unit>,
    pub total_count: usize,
}

/// Typed, transactional access to items, units and snapshots (§4.1).
///
/// Three `sled::Tree`s stand in for the `item:`, `unit:` and `snap:`
/// keyspaces described in §4.1/§6 — a tree is sled's native namespacing
/// primitive, so this is the idiomatic equivalent of the spec's prefixed
/// single-keyspace sketch. `snapshot_counts` is a small secondary index kept
/// in lockstep with `snapshots` so `CountBasedQuery`'s `total_count` doesn't
/// require an O(n) scan.
pub struct Repository {
    db: sled::Db,
    items: sled::Tree,
    units: sled::Tree,
    snapshots: sled::Tree,
    snapshot_counts: sled::Tree,
}

impl Repository {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let items = db.open_tree("items")?;
        let units = db.open_tree("units")?;
        let snapshots = db.open_tree("snapshots")?;
        let snapshot_counts = db.open_tree("snapshot_counts")?;
        Ok(Self {
            db,
            items,
            units,
            snapshots,
            snapshot_counts,
        })
    }

    fn next_seq(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    fn encode_snapshot_count(count: u64) -> [u8; 8] {
        count.to_be_bytes()
    }

    fn decode_snapshot_count(bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        u64::from_be_bytes(buf)
    }

    /// Runs `attempt` in a bounded retry loop with jittered backoff,
    /// matching §5's "retried with bounded exponential backoff (up to 5
    /// attempts)". Only genuine storage-level conflicts are retried;
    /// deliberate aborts (bad input, missing rows) surface immediately.
    fn with_retry<T, A, F>(mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, TransactionError<A>>,
        A: Into<Error>,
    {
        let mut attempt = 0u32;
        loop {
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(TransactionError::Abort(reason)) => return Err(reason.into()),
                Err(TransactionError::Storage(e)) => {
                    attempt += 1;
                    if attempt >= MAX_TXN_ATTEMPTS {
                        return Err(Error::Internal(format!(
                            "transaction conflict not resolved after {MAX_TXN_ATTEMPTS} attempts: {e}"
                        )));
                    }
                    let backoff = Duration::from_millis(2u64.pow(attempt) + (attempt as u64 * 3));
                    warn!(attempt, ?backoff, "transaction conflict, retrying");
                    thread::sleep(backoff);
                }
            }
        }
    }

    // ---- Items ----------------------------------------------------

    /// Atomically writes the item record and its `initial_creation`
    /// snapshot in one transaction (§4.1, P1/P2).
    pub fn add_item(
        &self,
        mut item: InventoryItem,
        initial_context: impl Into<String>,
        initial_metadata: HashMap<String, String>,
    ) -> Result<(InventoryItem, InventoryLevelSnapshot)> {
        if self.units.get(unit_key(item.primary_unit_id))?.is_none() {
            return Err(Error::NotFound(format!(
                "unit {} not found",
                item.primary_unit_id
            )));
        }
        for alt in &item.alternate_unit_ids {
            if self.units.get(unit_key(*alt))?.is_none() {
                return Err(Error::NotFound(format!("unit {alt} not found")));
            }
        }

        let seq = self.next_seq()?;
        let snapshot = InventoryLevelSnapshot {
            item_id: item.id,
            timestamp: item.created_at,
            seq,
            level: item.current_level,
            unit_id: item.primary_unit_id,
            source: SnapshotSource::InitialCreation,
            context: initial_context.into(),
            metadata: initial_metadata,
        };

        let item_bytes = codec::encode(&item)?;
        let snap_bytes = codec::encode(&snapshot)?;
        let skey = snapshot_key(item.id, snapshot.timestamp.timestamp_millis(), seq);
        let ikey = item_key(item.id);

        Self::with_retry(|| {
            (&self.items, &self.snapshots, &self.snapshot_counts).transaction(
                |(items, snaps, counts)| {
                    if items.get(ikey)?.is_some() {
                        return Err(ConflictableTransactionError::Abort(Abort::ItemAlreadyExists));
                    }
                    items.insert(&ikey, item_bytes.clone())?;
                    snaps.insert(&skey[..], snap_bytes.clone())?;
                    counts.insert(&ikey, &Self::encode_snapshot_count(1)[..])?;
                    Ok(())
                },
            )
        })?;

        item.updated_at = item.created_at;
        Ok((item, snapshot))
    }

    pub fn get_item(&self, id: Uuid) -> Result<InventoryItem> {
        match self.items.get(item_key(id))? {
            Some(bytes) => codec::decode(&bytes),
            None => Err(Error::NotFound(format!("item {id} not found"))),
        }
    }

    /// Atomic replace; does not emit a snapshot (§4.1).
    pub fn update_item(&self, item: &InventoryItem) -> Result<()> {
        let ikey = item_key(item.id);
        let bytes = codec::encode(item)?;
        Self::with_retry(|| {
            (&self.items,).transaction(|(items,)| {
                if items.get(ikey)?.is_none() {
                    return Err(ConflictableTransactionError::Abort(Abort::ItemMissing));
                }
                items.insert(&ikey, bytes.clone())?;
                Ok(())
            })
        })
    }

    /// Replaces the item record and appends a snapshot atomically — the
    /// coupling `UpdateInventoryLevel` depends on (§4.1, §4.6, P2).
    pub fn update_item_with_snapshot(
        &self,
        item: &InventoryItem,
        snapshot: &InventoryLevelSnapshot,
    ) -> Result<()> {
        let ikey = item_key(item.id);
        let item_bytes = codec::encode(item)?;
        let snap_bytes = codec::encode(snapshot)?;
        let skey = snapshot_key(item.id, snapshot.timestamp.timestamp_millis(), snapshot.seq);
        let count_key = ikey;

        Self::with_retry(|| {
            (&self.items, &self.snapshots, &self.snapshot_counts).transaction(
                |(items, snaps, counts)| {
                    if items.get(ikey)?.is_none() {
                        return Err(ConflictableTransactionError::Abort(Abort::ItemMissing));
                    }
                    items.insert(&ikey, item_bytes.clone())?;
                    snaps.insert(&skey[..], snap_bytes.clone())?;
                    let current = counts
                        .get(count_key)?
                        .map(|b| Self::decode_snapshot_count(&b))
                        .unwrap_or(0);
                    counts.insert(&count_key, &Self::encode_snapshot_count(current + 1)[..])?;
                    Ok(())
                },
            )
        })
    }

    /// Allocates the next `(timestamp, seq)` pair for a snapshot about to be
    /// written for `item_id`. Exposed so the service can build the snapshot
    /// it passes to `update_item_with_snapshot` without reaching into
    /// storage internals.
    pub fn next_snapshot_seq(&self) -> Result<u64> {
        self.next_seq()
    }

    /// Hard delete of the item and every snapshot belonging to it, in one
    /// transaction. Snapshot keys are gathered via a prefix scan just
    /// before the transaction; a snapshot inserted concurrently between the
    /// scan and the commit (a narrow race against an in-flight
    /// `UpdateInventoryLevel` on an item being deleted) can survive the
    /// delete — accepted, since the spec gives no cross-item or
    /// delete-vs-update ordering guarantee (§5).
    pub fn delete_item(&self, id: Uuid) -> Result<()> {
        let ikey = item_key(id);
        let prefix = snapshot_prefix(id);
        let snap_keys: Vec<sled::IVec> = self
            .snapshots
            .scan_prefix(prefix)
            .keys()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Self::with_retry(|| {
            (&self.items, &self.snapshots, &self.snapshot_counts).transaction(
                |(items, snaps, counts)| {
                    if items.get(ikey)?.is_none() {
                        return Err(ConflictableTransactionError::Abort(Abort::ItemMissing));
                    }
                    items.remove(ikey)?;
                    counts.remove(&ikey[..])?;
                    for key in &snap_keys {
                        snaps.remove(key.as_ref())?;
                    }
                    Ok(())
                },
            )
        })
    }

    pub fn list_items(&self, filters: &ItemFilters) -> Result<ItemPage> {
        let mut matched = Vec::new();
        for entry in self.items.iter() {
            let (_, bytes) = entry?;
            let item: InventoryItem = codec::decode(&bytes)?;

            if filters.low_stock_only && !item.is_low_stock() {
                continue;
            }
            if let Some(unit_filter) = &filters.unit_type_filter {
                let primary = self.get_unit(item.primary_unit_id)?;
                if &primary.category != unit_filter {
                    continue;
                }
            }
            matched.push(item);
        }

        // Stable by id: sled's key is the raw uuid, so tree iteration order
        // already is a deterministic total order over ids; this sort just
        // makes that explicit and independent of tree internals.
        matched.sort_by_key(|i| i.id);

        let total_count = matched.len();
        let start = filters.offset.min(matched.len());
        let end = match filters.limit {
            Some(limit) => (start + limit).min(matched.len()),
            None => matched.len(),
        };

        Ok(ItemPage {
            items: matched[start..end].to_vec(),
            total_count,
        })
    }

    // ---- Units ------------------------------------------------------

    pub fn add_unit(&self, unit: Unit) -> Result<Unit> {
        let ukey = unit_key(unit.id);
        let bytes = codec::encode(&unit)?;
        Self::with_retry(|| {
            (&self.units,).transaction(|(units,)| {
                if units.get(ukey)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(Abort::UnitAlreadyExists));
                }
                units.insert(&ukey, bytes.clone())?;
                Ok(())
            })
        })?;
        Ok(unit)
    }

    pub fn get_unit(&self, id: Uuid) -> Result<Unit> {
        match self.units.get(unit_key(id))? {
            Some(bytes) => codec::decode(&bytes),
            None => Err(Error::NotFound(format!("unit {id} not found"))),
        }
    }

    pub fn update_unit(&self, unit: &Unit) -> Result<()> {
        let ukey = unit_key(unit.id);
        let bytes = codec::encode(unit)?;
        Self::with_retry(|| {
            (&self.units,).transaction(|(units,)| {
                if units.get(ukey)?.is_none() {
                    return Err(ConflictableTransactionError::Abort(Abort::ItemMissing));
                }
                units.insert(&ukey, bytes.clone())?;
                Ok(())
            })
        })
    }

    /// Fails with `FailedPrecondition` if any item references the unit,
    /// unless `force` is set (§3, §4.1, P5).
    pub fn delete_unit(&self, id: Uuid, force: bool) -> Result<()> {
        if !force {
            if let Some(item) = self.first_item_referencing_unit(id)? {
                return Err(Error::FailedPrecondition(format!(
                    "unit {id} is in use by item {} ({})",
                    item.name, item.id
                )));
            }
        }
        let ukey = unit_key(id);
        Self::with_retry(|| {
            (&self.units,).transaction(|(units,)| {
                if units.get(ukey)?.is_none() {
                    return Err(ConflictableTransactionError::Abort(Abort::ItemMissing));
                }
                units.remove(ukey)?;
                Ok(())
            })
        })
    }

    fn first_item_referencing_unit(&self, unit_id: Uuid) -> Result<Option<InventoryItem>> {
        for entry in self.items.iter() {
            let (_, bytes) = entry?;
            let item: InventoryItem = codec::decode(&bytes)?;
            if item.references_unit(unit_id) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    pub fn list_units(&self, filters: &UnitFilters) -> Result<UnitPage> {
        let mut matched = Vec::new();
        for entry in self.units.iter() {
            let (_, bytes) = entry?;
            let unit: Unit = codec::decode(&bytes)?;
            if let Some(category) = &filters.category {
                if &unit.category != category {
                    continue;
                }
            }
            matched.push(unit);
        }
        matched.sort_by_key(|u| u.id);

        let total_count = matched.len();
        let start = filters.offset.min(matched.len());
        let end = match filters.limit {
            Some(limit) => (start + limit).min(matched.len()),
            None => matched.len(),
        };

        Ok(UnitPage {
            units: matched[start..end].to_vec(),
            total_count,
        })
    }

    // ---- Snapshots / history -----------------------------------------

    pub fn get_inventory_history(
        &self,
        item_id: Uuid,
        query: HistoryQuery,
        cancel: &CancellationToken,
    ) -> Result<HistoryResult> {
        history::execute(self, item_id, query, cancel)
    }

    pub fn get_earliest_snapshot(&self, item_id: Uuid) -> Result<Option<InventoryLevelSnapshot>> {
        let prefix = snapshot_prefix(item_id);
        match self.snapshots.scan_prefix(prefix).next() {
            Some(entry) => {
                let (_, bytes) = entry?;
                Ok(Some(codec::decode(&bytes)?))
            }
            None => Ok(None),
        }
    }

    pub fn get_latest_snapshot(&self, item_id: Uuid) -> Result<Option<InventoryLevelSnapshot>> {
        let prefix = snapshot_prefix(item_id);
        match self.snapshots.scan_prefix(prefix).next_back() {
            Some(entry) => {
                let (_, bytes) = entry?;
                Ok(Some(codec::decode(&bytes)?))
            }
            None => Ok(None),
        }
    }

    pub fn snapshot_count(&self, item_id: Uuid) -> Result<u64> {
        Ok(self
            .snapshot_counts
            .get(item_key(item_id))?
            .map(|b| Self::decode_snapshot_count(&b))
            .unwrap_or(0))
    }

    /// Raw access for the history engine's range/reverse scans.
    pub(crate) fn snapshots_tree(&self) -> &sled::Tree {
        &self.snapshots
    }
}

impl From<Abort> for Error {
    fn from(a: Abort) -> Self {
        match a {
            Abort::ItemAlreadyExists => {
                Error::AlreadyExists("item with this id already exists".into())
            }
            Abort::ItemMissing => Error::NotFound("item not found".into()),
            Abort::UnitAlreadyExists => {
                Error::AlreadyExists("unit with this id already exists".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PredictionModelConfig;

    fn temp_repo() -> (Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        (repo, dir)
    }

    fn sample_unit() -> Unit {
        let now = Utc::now();
        Unit {
            id: Uuid::new_v4(),
            name: "kilogram".into(),
            symbol: "kg".into(),
            description: String::new(),
            base_conversion_factor: 1.0,
            category: "mass".into(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    fn sample_item(primary_unit_id: Uuid, level: f64) -> InventoryItem {
        let now = Utc::now();
        InventoryItem {
            id: Uuid::new_v4(),
            name: "A".into(),
            description: String::new(),
            current_level: level,
            max_capacity: 200.0,
            low_stock_threshold: 20.0,
            primary_unit_id,
            alternate_unit_ids: vec![],
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            active_prediction_model: None,
            consumption_behavior: None,
        }
    }

    #[test]
    fn add_item_writes_initial_snapshot() {
        let (repo, _dir) = temp_repo();
        let unit = repo.add_unit(sample_unit()).unwrap();
        let item = sample_item(unit.id, 100.0);

        let (stored, snap) = repo
            .add_item(item, "initial", HashMap::new())
            .unwrap();

        assert_eq!(snap.level, 100.0);
        assert_eq!(snap.source.as_str(), "initial_creation");
        assert_eq!(repo.snapshot_count(stored.id).unwrap(), 1);

        let latest = repo.get_latest_snapshot(stored.id).unwrap().unwrap();
        assert_eq!(latest.level, 100.0);
    }

    #[test]
    fn add_item_rejects_unknown_unit() {
        let (repo, _dir) = temp_repo();
        let item = sample_item(Uuid::new_v4(), 10.0);
        let err = repo.add_item(item, "initial", HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_unit_fails_when_in_use_unless_forced() {
        let (repo, _dir) = temp_repo();
        let unit = repo.add_unit(sample_unit()).unwrap();
        let item = sample_item(unit.id, 10.0);
        repo.add_item(item, "initial", HashMap::new()).unwrap();

        let err = repo.delete_unit(unit.id, false).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));

        repo.delete_unit(unit.id, true).unwrap();
        assert!(matches!(
            repo.get_unit(unit.id).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn delete_item_cascades_snapshots() {
        let (repo, _dir) = temp_repo();
        let unit = repo.add_unit(sample_unit()).unwrap();
        let item = sample_item(unit.id, 10.0);
        let (stored, _) = repo.add_item(item, "initial", HashMap::new()).unwrap();

        repo.delete_item(stored.id).unwrap();
        assert!(matches!(
            repo.get_item(stored.id).unwrap_err(),
            Error::NotFound(_)
        ));
        assert_eq!(
            repo.get_latest_snapshot(stored.id).unwrap(),
            None
        );
    }

    #[test]
    fn list_items_filters_low_stock_and_paginates() {
        let (repo, _dir) = temp_repo();
        let unit = repo.add_unit(sample_unit()).unwrap();

        for level in [5.0, 50.0, 100.0] {
            let item = sample_item(unit.id, level);
            repo.add_item(item, "initial", HashMap::new()).unwrap();
        }

        let page = repo
            .list_items(&ItemFilters {
                low_stock_only: true,
                unit_type_filter: None,
                limit: None,
                offset: 0,
            })
            .unwrap();
        assert_eq!(page.total_count, 1);

        let page_all = repo
            .list_items(&ItemFilters::default())
            .unwrap();
        assert_eq!(page_all.total_count, 3);
    }

    #[test]
    fn default_prediction_model_tag() {
        let model = InventoryItem::default_prediction_model();
        assert_eq!(model.tag(), "parametric_linear");
        assert!(matches!(model, PredictionModelConfig::Parametric(_)));
    }
}
