//! Deterministic byte encoding for domain records and keys.
//!
//! Values are encoded with `bincode` over `serde`-derived structs, which
//! gives a stable field order for a fixed struct shape. Keys are hand-rolled
//! so that lexicographic byte order matches the ordering the spec requires
//! (chronological per-item snapshot order, stable item/unit id order).

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// `item:<id>` key — just the raw uuid bytes, since the item tree is already
/// a separate namespace.
pub fn item_key(id: Uuid) -> [u8; 16] {
    *id.as_bytes()
}

/// `unit:<id>` key.
pub fn unit_key(id: Uuid) -> [u8; 16] {
    *id.as_bytes()
}

/// `snap:<item_id>:<big-endian-timestamp>:<monotonic-seq>` key.
///
/// `timestamp_millis` MUST be non-negative (true for any wall-clock time
/// after the Unix epoch, which is all we ever record). Encoding it
/// big-endian as `u64` and appending a big-endian `seq` makes the 32-byte
/// key's lexicographic order equal to chronological order, with `seq`
/// breaking ties between snapshots recorded at the same millisecond.
pub fn snapshot_key(item_id: Uuid, timestamp_millis: i64, seq: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[0..16].copy_from_slice(item_id.as_bytes());
    key[16..24].copy_from_slice(&(timestamp_millis as u64).to_be_bytes());
    key[24..32].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Prefix matching every snapshot belonging to `item_id`.
pub fn snapshot_prefix(item_id: Uuid) -> [u8; 16] {
    *item_id.as_bytes()
}

/// Lower bound of the snapshot range for `item_id` starting at `timestamp_millis`
/// (inclusive), for range scans.
pub fn snapshot_range_start(item_id: Uuid, timestamp_millis: i64) -> [u8; 32] {
    snapshot_key(item_id, timestamp_millis, 0)
}

/// Upper bound (inclusive) of the snapshot range for `item_id` ending at
/// `timestamp_millis`. Uses `seq = u64::MAX` so the bound includes every
/// snapshot recorded at that millisecond.
pub fn snapshot_range_end(item_id: Uuid, timestamp_millis: i64) -> [u8; 32] {
    snapshot_key(item_id, timestamp_millis, u64::MAX)
}

pub fn item_id_from_snapshot_key(key: &[u8]) -> Uuid {
    Uuid::from_slice(&key[0..16]).expect("snapshot key always carries a 16-byte item id")
}

pub fn timestamp_millis_from_snapshot_key(key: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[16..24]);
    u64::from_be_bytes(buf) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn snapshot_keys_sort_chronologically() {
        let item = Uuid::new_v4();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let k1 = snapshot_key(item, t1.timestamp_millis(), 0);
        let k2a = snapshot_key(item, t2.timestamp_millis(), 0);
        let k2b = snapshot_key(item, t2.timestamp_millis(), 1);

        assert!(k1 < k2a);
        assert!(k2a < k2b);
    }

    #[test]
    fn different_items_do_not_interleave() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ka = snapshot_key(a, 1_000, 0);
        let kb = snapshot_key(b, 0, 0);
        // No ordering guarantee is claimed across items; just confirm the
        // prefix partitions a scan_prefix() cleanly.
        assert_eq!(&ka[0..16], a.as_bytes());
        assert_eq!(&kb[0..16], b.as_bytes());
    }

    #[test]
    fn round_trip_encode_decode() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Dummy {
            a: u32,
            b: String,
        }
        let d = Dummy {
            a: 7,
            b: "hi".into(),
        };
        let bytes = encode(&d).unwrap();
        let back: Dummy = decode(&bytes).unwrap();
        assert_eq!(d, back);
    }
}
