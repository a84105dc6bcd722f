//! Translates the three query shapes (§4.2) into scans over the snapshot
//! keyspace.

use crate::cancel::CancellationToken;
use crate::codec::{self, item_id_from_snapshot_key, snapshot_prefix, snapshot_range_end, snapshot_range_start};
use crate::domain::InventoryLevelSnapshot;
use crate::error::{Error, Result};
use crate::store::Repository;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    All,
}

impl Granularity {
    /// Bucket width in milliseconds. `Month` is approximated as a fixed
    /// 30-day window (§9 Open Question — documented in DESIGN.md) since
    /// snapshot bucketing needs a constant width to stay deterministic and
    /// independent of calendar alignment quirks.
    fn bucket_millis(self) -> Option<i64> {
        match self {
            Granularity::Minute => Some(60_000),
            Granularity::Hour => Some(3_600_000),
            Granularity::Day => Some(86_400_000),
            Granularity::Week => Some(7 * 86_400_000),
            Granularity::Month => Some(30 * 86_400_000),
            Granularity::All => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum HistoryQuery {
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        max_points: Option<usize>,
    },
    CountBased {
        count: usize,
    },
    TimePoint {
        from_time: DateTime<Utc>,
        max_points: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct HistoryResult {
    /// Newest-first.
    pub snapshots: Vec<InventoryLevelSnapshot>,
    pub total_count: usize,
    pub more_data_available: bool,
}

pub fn execute(
    repo: &Repository,
    item_id: Uuid,
    query: HistoryQuery,
    cancel: &CancellationToken,
) -> Result<HistoryResult> {
    match query {
        HistoryQuery::CountBased { count } => count_based(repo, item_id, count, cancel),
        HistoryQuery::TimeRange {
            start,
            end,
            granularity,
            max_points,
        } => time_range(repo, item_id, start, end, granularity, max_points, cancel),
        HistoryQuery::TimePoint {
            from_time,
            max_points,
        } => time_range(
            repo,
            item_id,
            from_time,
            DateTime::<Utc>::MAX_UTC,
            Granularity::All,
            max_points,
            cancel,
        ),
    }
}

/// Reverse-scans from the latest key, the efficient O(count) path (§4.2).
fn count_based(
    repo: &Repository,
    item_id: Uuid,
    count: usize,
    cancel: &CancellationToken,
) -> Result<HistoryResult> {
    let prefix = snapshot_prefix(item_id);
    let mut out = Vec::with_capacity(count.min(1024));

    for entry in repo.snapshots_tree().scan_prefix(prefix).rev() {
        cancel.check()?;
        if out.len() >= count {
            break;
        }
        let (_, bytes) = entry?;
        out.push(codec::decode::<InventoryLevelSnapshot>(&bytes)?);
    }

    let total_count = repo.snapshot_count(item_id)? as usize;
    let more_data_available = total_count > out.len();

    Ok(HistoryResult {
        snapshots: out,
        total_count,
        more_data_available,
    })
}

#[allow(clippy::too_many_arguments)]
fn time_range(
    repo: &Repository,
    item_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    max_points: Option<usize>,
    cancel: &CancellationToken,
) -> Result<HistoryResult> {
    if end < start {
        return Err(Error::InvalidArgument(
            "history range end precedes start".into(),
        ));
    }

    let start_key = snapshot_range_start(item_id, start.timestamp_millis());
    let end_key = snapshot_range_end(item_id, clamp_millis(end));

    let mut points: Vec<InventoryLevelSnapshot> = Vec::new();

    match granularity.bucket_millis() {
        None => {
            for entry in repo.snapshots_tree().range(start_key..=end_key) {
                cancel.check()?;
                let (key, bytes) = entry?;
                debug_assert_eq!(item_id_from_snapshot_key(&key), item_id);
                points.push(codec::decode(&bytes)?);
            }
        }
        Some(width) => {
            // Ascending scan, keeping the LAST snapshot seen per bucket —
            // the bucketing policy pinned in DESIGN.md.
            let mut current_bucket: Option<i64> = None;
            for entry in repo.snapshots_tree().range(start_key..=end_key) {
                cancel.check()?;
                let (key, bytes) = entry?;
                let ts = crate::codec::timestamp_millis_from_snapshot_key(&key);
                let bucket = ts.div_euclid(width);
                let snapshot: InventoryLevelSnapshot = codec::decode(&bytes)?;

                if current_bucket == Some(bucket) {
                    *points.last_mut().expect("bucket has a seed point") = snapshot;
                } else {
                    current_bucket = Some(bucket);
                    points.push(snapshot);
                }
            }
        }
    }

    // `points` is currently oldest-first (ascending scan); the contract
    // wants newest-first.
    points.reverse();

    let total_count = points.len();
    if let Some(max) = max_points {
        points.truncate(max);
    }
    let more_data_available = total_count > points.len();

    Ok(HistoryResult {
        snapshots: points,
        total_count,
        more_data_available,
    })
}

fn clamp_millis(t: DateTime<Utc>) -> i64 {
    // DateTime::<Utc>::MAX_UTC overflows i64 millis; treat anything at or
    // past that as "no upper bound" by saturating to i64::MAX.
    t.timestamp_millis_opt().unwrap_or(i64::MAX)
}

trait SaturatingMillis {
    fn timestamp_millis_opt(&self) -> Option<i64>;
}

impl SaturatingMillis for DateTime<Utc> {
    fn timestamp_millis_opt(&self) -> Option<i64> {
        // chrono's timestamp_millis() panics on overflow for extreme dates;
        // MAX_UTC is the only such value we ever pass through here.
        if *self == DateTime::<Utc>::MAX_UTC {
            None
        } else {
            Some(self.timestamp_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InventoryItem, SnapshotSource, Unit};
    use crate::store::Repository;
    use chrono::Duration;
    use std::collections::HashMap;

    fn repo_with_item() -> (Repository, tempfile::TempDir, Uuid) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        let now = Utc::now();
        let unit = repo
            .add_unit(Unit {
                id: Uuid::new_v4(),
                name: "kg".into(),
                symbol: "kg".into(),
                description: String::new(),
                base_conversion_factor: 1.0,
                category: "mass".into(),
                created_at: now,
                updated_at: now,
                metadata: HashMap::new(),
            })
            .unwrap();
        let item = InventoryItem {
            id: Uuid::new_v4(),
            name: "A".into(),
            description: String::new(),
            current_level: 100.0,
            max_capacity: 200.0,
            low_stock_threshold: 20.0,
            primary_unit_id: unit.id,
            alternate_unit_ids: vec![],
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            active_prediction_model: None,
            consumption_behavior: None,
        };
        let (stored, _) = repo.add_item(item, "initial", HashMap::new()).unwrap();
        (repo, dir, stored.id)
    }

    fn push_update(repo: &Repository, item_id: Uuid, level: f64, offset_secs: i64) {
        let mut item = repo.get_item(item_id).unwrap();
        let ts = item.created_at + Duration::seconds(offset_secs);
        item.current_level = level;
        item.updated_at = ts;
        let seq = repo.next_snapshot_seq().unwrap();
        let snap = InventoryLevelSnapshot {
            item_id,
            timestamp: ts,
            seq,
            level,
            unit_id: item.primary_unit_id,
            source: SnapshotSource::InventoryUpdate,
            context: "test".into(),
            metadata: HashMap::new(),
        };
        repo.update_item_with_snapshot(&item, &snap).unwrap();
    }

    #[test]
    fn count_based_is_newest_first_prefix_of_full_order() {
        let (repo, _dir, item_id) = repo_with_item();
        push_update(&repo, item_id, 75.0, 10);
        push_update(&repo, item_id, 90.0, 20);
        push_update(&repo, item_id, 50.0, 30);

        let result = execute(
            &repo,
            item_id,
            HistoryQuery::CountBased { count: 10 },
            &CancellationToken::new(),
        )
        .unwrap();

        let levels: Vec<f64> = result.snapshots.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![50.0, 90.0, 75.0, 100.0]);
        assert_eq!(result.total_count, 4);
        assert!(!result.more_data_available);
    }

    #[test]
    fn count_based_caps_and_reports_more_data() {
        let (repo, _dir, item_id) = repo_with_item();
        push_update(&repo, item_id, 75.0, 10);
        push_update(&repo, item_id, 90.0, 20);

        let result = execute(
            &repo,
            item_id,
            HistoryQuery::CountBased { count: 2 },
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(result.snapshots.len(), 2);
        assert_eq!(result.total_count, 3);
        assert!(result.more_data_available);
    }

    #[test]
    fn time_range_all_granularity_returns_every_point() {
        let (repo, _dir, item_id) = repo_with_item();
        push_update(&repo, item_id, 75.0, 10);
        push_update(&repo, item_id, 90.0, 20);

        let item = repo.get_item(item_id).unwrap();
        let result = execute(
            &repo,
            item_id,
            HistoryQuery::TimeRange {
                start: item.created_at - Duration::seconds(1),
                end: item.created_at + Duration::seconds(100),
                granularity: Granularity::All,
                max_points: None,
            },
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(result.total_count, 3);
    }

    #[test]
    fn determinism_repeated_query_is_identical() {
        let (repo, _dir, item_id) = repo_with_item();
        push_update(&repo, item_id, 75.0, 10);

        let q = || {
            execute(
                &repo,
                item_id,
                HistoryQuery::CountBased { count: 5 },
                &CancellationToken::new(),
            )
            .unwrap()
        };
        let a = q();
        let b = q();
        assert_eq!(
            a.snapshots.iter().map(|s| s.level).collect::<Vec<_>>(),
            b.snapshots.iter().map(|s| s.level).collect::<Vec<_>>()
        );
    }
}
