//! Event bus capability (§6, §9 "Event bus coupling"): injected at
//! `InventoryService` construction, fire-and-forget, never propagated into
//! caller error (§5, §7).

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct InventoryLevelChanged {
    pub item_id: Uuid,
    pub name: String,
    pub previous_level: f64,
    pub new_level: f64,
    pub unit_id: Uuid,
    pub low_stock_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct InventoryItemRemoved {
    pub item_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum InventoryEvent {
    LevelChanged(InventoryLevelChanged),
    ItemRemoved(InventoryItemRemoved),
}

/// Core does not import any particular bus implementation (§9) — callers
/// inject one at construction.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: InventoryEvent);
}

/// The default sink: logs every event at `info`, never fails (§5 "no
/// backpressure; best-effort").
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: InventoryEvent) {
        match event {
            InventoryEvent::LevelChanged(e) => tracing::info!(
                item_id = %e.item_id,
                name = %e.name,
                previous_level = e.previous_level,
                new_level = e.new_level,
                "inventory level changed"
            ),
            InventoryEvent::ItemRemoved(e) => {
                tracing::info!(item_id = %e.item_id, name = %e.name, "inventory item removed")
            }
        }
    }
}

/// A sink that drops every event, for tests that don't care about the bus.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: InventoryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_every_event_variant() {
        let sink = NullEventSink;
        sink.publish(InventoryEvent::LevelChanged(InventoryLevelChanged {
            item_id: Uuid::new_v4(),
            name: "widget".into(),
            previous_level: 10.0,
            new_level: 5.0,
            unit_id: Uuid::new_v4(),
            low_stock_threshold: 2.0,
        }));
        sink.publish(InventoryEvent::ItemRemoved(InventoryItemRemoved {
            item_id: Uuid::new_v4(),
            name: "widget".into(),
        }));
    }
}
