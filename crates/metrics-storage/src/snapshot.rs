use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::StorageError;
use crate::memory::{MemoryStorage, SnapshotDocument};

/// Drives durability for the in-memory storage variant: either a timer-driven
/// periodic flush, or a flush triggered by the store's dirty signal. Either
/// mode guarantees at-most-one flush in flight (INV-4) via an internal mutex
/// that serializes writers; a signal arriving mid-flush is coalesced into the
/// next iteration rather than queued.
pub struct SnapshotCoordinator {
    storage: Arc<MemoryStorage>,
    path: PathBuf,
    writing: Mutex<()>,
}

impl SnapshotCoordinator {
    pub fn new(storage: Arc<MemoryStorage>, path: impl Into<PathBuf>) -> Self {
        SnapshotCoordinator {
            storage,
            path: path.into(),
            writing: Mutex::new(()),
        }
    }

    /// Timer-driven mode: flush every `interval`, ticking independently of
    /// mutation activity. Used when `store_interval > 0`.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.flush_once().await {
                        error!(error = %err, "periodic snapshot flush failed");
                    }
                }
            }
        }
        self.final_flush().await;
    }

    /// Signal-driven mode: flush once per dirty signal. Used when
    /// `store_interval == 0`. Any signals received while a flush is already
    /// in progress collapse into the next flush rather than triggering one
    /// each.
    pub async fn run_signal_driven(
        self: Arc<Self>,
        mut dirty_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                signal = dirty_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    if let Err(err) = self.flush_once().await {
                        error!(error = %err, "signal-driven snapshot flush failed");
                    }
                }
            }
        }
        self.final_flush().await;
    }

    /// Performs the final flush the lifecycle controller requires before
    /// shutdown completes.
    pub async fn final_flush(&self) {
        if let Err(err) = self.flush_once().await {
            error!(error = %err, "final snapshot flush failed");
        } else {
            info!("final snapshot flush complete");
        }
    }

    async fn flush_once(&self) -> Result<(), StorageError> {
        let _guard = self.writing.lock().await;
        let doc = self.storage.snapshot_document();
        write_snapshot_atomic(&self.path, &doc).await
    }

    /// Restores a snapshot onto `storage` if `path` exists and parses. Called
    /// at startup when `restore = true`. Restoring onto a non-empty store
    /// double-counts counters; callers are expected to restore only once,
    /// onto a freshly constructed store.
    pub async fn restore(storage: &MemoryStorage, path: &Path) -> Result<bool, StorageError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no snapshot file to restore");
            return Ok(false);
        }
        let bytes = fs::read(path).await?;
        if bytes.is_empty() {
            warn!(path = %path.display(), "snapshot file is empty, skipping restore");
            return Ok(false);
        }
        let doc: SnapshotDocument = serde_json::from_slice(&bytes)?;
        storage.load_snapshot_document(&doc);
        info!(
            path = %path.display(),
            gauges = doc.data_gauge.len(),
            counters = doc.data_counter.len(),
            "restored snapshot"
        );
        Ok(true)
    }
}

async fn write_snapshot_atomic(path: &Path, doc: &SnapshotDocument) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec(doc)?;
    {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
    }
    fs::rename(&temp_path, path).await?;
    sync_parent_dir(path).await?;
    Ok(())
}

async fn sync_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MetricValue, StorageEngine};

    #[tokio::test]
    async fn flush_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let storage = Arc::new(MemoryStorage::new(None));
        let ct = CancellationToken::new();
        storage.store(&ct, "Alloc", MetricValue::Gauge(1.0)).await.unwrap();
        storage.store(&ct, "PollCount", MetricValue::Counter(5)).await.unwrap();

        let coordinator = SnapshotCoordinator::new(storage.clone(), &path);
        coordinator.flush_once().await.unwrap();
        assert!(path.exists());

        let restored = MemoryStorage::new(None);
        let did_restore = SnapshotCoordinator::restore(&restored, &path).await.unwrap();
        assert!(did_restore);
        assert_eq!(
            restored.load(&ct, metrics_core::MetricKind::Gauge, "Alloc").await.unwrap(),
            MetricValue::Gauge(1.0)
        );
        assert_eq!(
            restored.load(&ct, metrics_core::MetricKind::Counter, "PollCount").await.unwrap(),
            MetricValue::Counter(5)
        );
    }

    #[tokio::test]
    async fn restore_on_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let restored = MemoryStorage::new(None);
        let did_restore = SnapshotCoordinator::restore(&restored, &path).await.unwrap();
        assert!(!did_restore);
    }
}
