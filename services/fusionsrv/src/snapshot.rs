//! Published snapshot store
//!
//! Lock-free handoff between the coordinator and consumers. The
//! coordinator builds a complete [`Snapshot`] per tick and publishes it in
//! one atomic swap; readers always observe a fully consistent snapshot,
//! never a half-written tick.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use fusion_model::Snapshot;

pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    version: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            version: AtomicU64::new(0),
        }
    }

    /// Stamp the snapshot with the next version and publish it atomically.
    /// Versions are strictly increasing across the process lifetime.
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        snapshot.version = version;
        debug!(
            version,
            devices = snapshot.devices.len(),
            groups = snapshot.groups.len(),
            "snapshot published"
        );
        self.current.store(Arc::new(snapshot));
        version
    }

    /// Current published snapshot. Cheap and wait-free.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fusion_model::{DeviceSerial, DeviceState, ValidatedReading};

    fn snapshot_with_device(serial: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty();
        snapshot.captured_at = Utc::now();
        snapshot.devices.insert(
            DeviceSerial::new(serial),
            DeviceState {
                reading: ValidatedReading::default(),
                degraded: false,
                bank: None,
                smart_ports: Vec::new(),
            },
        );
        snapshot
    }

    #[test]
    fn starts_empty_at_version_zero() {
        let store = SnapshotStore::new();
        let snapshot = store.current();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.devices.is_empty());
    }

    #[test]
    fn versions_strictly_increase() {
        let store = SnapshotStore::new();
        let v1 = store.publish(snapshot_with_device("A"));
        let v2 = store.publish(snapshot_with_device("B"));
        assert!(v2 > v1);
        assert_eq!(store.current().version, v2);
    }

    #[test]
    fn readers_keep_their_snapshot_across_publishes() {
        let store = SnapshotStore::new();
        store.publish(snapshot_with_device("A"));
        let held = store.current();
        store.publish(snapshot_with_device("B"));

        // The held snapshot is unchanged; the store moved on.
        assert!(held.device(&DeviceSerial::new("A")).is_some());
        assert!(store.current().device(&DeviceSerial::new("B")).is_some());
        assert!(store.current().device(&DeviceSerial::new("A")).is_none());
    }
}
