use std::collections::HashMap;

use async_trait::async_trait;
use metrics_core::MetricKind;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

/// A typed value ready for a storage write. The kind is inferred from the
/// discriminant rather than threaded separately, per the model's tagged-union
/// dispatch (no untyped "any" write parameter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// The uniform read/write contract shared by the in-memory and relational
/// storage backends. Every operation carries a [`CancellationToken`] and MUST
/// abandon work (returning [`StorageError::Cancelled`]) promptly once it
/// fires, performing no partial side effect.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Gauge writes replace; counter writes add to the running total.
    async fn store(
        &self,
        cancel: &CancellationToken,
        id: &str,
        value: MetricValue,
    ) -> Result<(), StorageError>;

    /// Returns the current value for `id` under `kind`, or
    /// [`StorageError::NotFound`] if absent under that kind — a read never
    /// silently returns the other kind's value.
    async fn load(
        &self,
        cancel: &CancellationToken,
        kind: MetricKind,
        id: &str,
    ) -> Result<MetricValue, StorageError>;

    /// A defensive copy of the full gauge mapping.
    async fn load_all_gauge(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, f64>, StorageError>;

    /// A defensive copy of the full counter mapping.
    async fn load_all_counter(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, i64>, StorageError>;

    /// Probes backend reachability for `/ping`. The in-memory variant is
    /// always reachable; the relational variant issues a round-trip query.
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), StorageError>;
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), StorageError> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}
