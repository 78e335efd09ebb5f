use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use metrics_core::MetricKind;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{check_cancelled, MetricValue, StorageEngine};
use crate::error::StorageError;

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// In-memory storage guarded by a single read/write lock over both maps
/// (INV-4's "at-most-one flush in flight" is a property of the snapshot
/// coordinator, not of this lock, which only ever protects one write at a
/// time by construction).
///
/// Mutations are reported to an optional subscriber rather than coupled
/// directly to a snapshot coordinator: the store has no notion of "who is
/// listening", it just emits on the channel it was built with. This keeps
/// the coordinator a plain subscriber instead of a special-cased dependency.
pub struct MemoryStorage {
    data: RwLock<Maps>,
    dirty: Option<mpsc::Sender<()>>,
}

impl MemoryStorage {
    /// `dirty` should be `Some` only when the caller runs the snapshot
    /// coordinator in signal-driven mode (store interval == 0); `None` when
    /// it runs in periodic timer mode, per §4.3.
    pub fn new(dirty: Option<mpsc::Sender<()>>) -> Self {
        MemoryStorage {
            data: RwLock::new(Maps::default()),
            dirty,
        }
    }

    fn notify_dirty(&self) {
        if let Some(tx) = &self.dirty {
            // Capacity-1 channel: a pending signal already covers this
            // mutation, so a full channel is not an error.
            let _ = tx.try_send(());
        }
    }

    /// Replays a snapshot document onto this store via the normal write
    /// contract. Counters accumulate, so replaying onto a non-empty store
    /// double-counts; callers must restore onto an empty store (see the
    /// design notes on snapshot restore).
    pub fn load_snapshot_document(&self, doc: &SnapshotDocument) {
        let mut guard = self.data.write().expect("memory storage lock poisoned");
        for (id, value) in &doc.data_gauge {
            guard.gauges.insert(id.clone(), *value);
        }
        for (id, delta) in &doc.data_counter {
            *guard.counters.entry(id.clone()).or_insert(0) += delta;
        }
        drop(guard);
        self.notify_dirty();
    }

    pub fn snapshot_document(&self) -> SnapshotDocument {
        let guard = self.data.read().expect("memory storage lock poisoned");
        SnapshotDocument {
            data_gauge: guard.gauges.clone(),
            data_counter: guard.counters.clone(),
        }
    }
}

/// The `{data_gauge, data_counter}` shape written to and read from the
/// snapshot file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub data_gauge: HashMap<String, f64>,
    #[serde(default)]
    pub data_counter: HashMap<String, i64>,
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    async fn store(
        &self,
        cancel: &CancellationToken,
        id: &str,
        value: MetricValue,
    ) -> Result<(), StorageError> {
        check_cancelled(cancel)?;
        {
            let mut guard = self.data.write().expect("memory storage lock poisoned");
            match value {
                MetricValue::Gauge(v) => {
                    guard.gauges.insert(id.to_string(), v);
                }
                MetricValue::Counter(delta) => {
                    *guard.counters.entry(id.to_string()).or_insert(0) += delta;
                }
            }
        }
        self.notify_dirty();
        Ok(())
    }

    async fn load(
        &self,
        cancel: &CancellationToken,
        kind: MetricKind,
        id: &str,
    ) -> Result<MetricValue, StorageError> {
        check_cancelled(cancel)?;
        let guard = self.data.read().expect("memory storage lock poisoned");
        match kind {
            MetricKind::Gauge => guard
                .gauges
                .get(id)
                .copied()
                .map(MetricValue::Gauge)
                .ok_or_else(|| StorageError::NotFound { kind: "gauge", id: id.to_string() }),
            MetricKind::Counter => guard
                .counters
                .get(id)
                .copied()
                .map(MetricValue::Counter)
                .ok_or_else(|| StorageError::NotFound { kind: "counter", id: id.to_string() }),
        }
    }

    async fn load_all_gauge(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, f64>, StorageError> {
        check_cancelled(cancel)?;
        Ok(self.data.read().expect("memory storage lock poisoned").gauges.clone())
    }

    async fn load_all_counter(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, i64>, StorageError> {
        check_cancelled(cancel)?;
        Ok(self.data.read().expect("memory storage lock poisoned").counters.clone())
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        check_cancelled(cancel)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn gauge_write_replaces() {
        let store = MemoryStorage::new(None);
        let ct = token();
        store.store(&ct, "Alloc", MetricValue::Gauge(1.0)).await.unwrap();
        store.store(&ct, "Alloc", MetricValue::Gauge(2.0)).await.unwrap();
        assert_eq!(
            store.load(&ct, MetricKind::Gauge, "Alloc").await.unwrap(),
            MetricValue::Gauge(2.0)
        );
    }

    #[tokio::test]
    async fn counter_write_accumulates() {
        let store = MemoryStorage::new(None);
        let ct = token();
        store.store(&ct, "testCounter", MetricValue::Counter(100)).await.unwrap();
        store.store(&ct, "testCounter", MetricValue::Counter(100)).await.unwrap();
        assert_eq!(
            store.load(&ct, MetricKind::Counter, "testCounter").await.unwrap(),
            MetricValue::Counter(200)
        );
    }

    #[tokio::test]
    async fn kind_mismatch_is_not_found() {
        let store = MemoryStorage::new(None);
        let ct = token();
        store.store(&ct, "Alloc", MetricValue::Gauge(1.0)).await.unwrap();
        let err = store.load(&ct, MetricKind::Counter, "Alloc").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let store = MemoryStorage::new(None);
        let ct = token();
        ct.cancel();
        let err = store.store(&ct, "Alloc", MetricValue::Gauge(1.0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
    }

    #[tokio::test]
    async fn mutation_emits_dirty_signal_when_subscribed() {
        let (tx, mut rx) = mpsc::channel(1);
        let store = MemoryStorage::new(Some(tx));
        let ct = token();
        store.store(&ct, "Alloc", MetricValue::Gauge(1.0)).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_values() {
        let store = MemoryStorage::new(None);
        let ct = token();
        store.store(&ct, "Alloc", MetricValue::Gauge(1.5)).await.unwrap();
        store.store(&ct, "PollCount", MetricValue::Counter(3)).await.unwrap();
        let doc = store.snapshot_document();

        let restored = MemoryStorage::new(None);
        restored.load_snapshot_document(&doc);
        assert_eq!(
            restored.load(&ct, MetricKind::Gauge, "Alloc").await.unwrap(),
            MetricValue::Gauge(1.5)
        );
        assert_eq!(
            restored.load(&ct, MetricKind::Counter, "PollCount").await.unwrap(),
            MetricValue::Counter(3)
        );
    }
}
