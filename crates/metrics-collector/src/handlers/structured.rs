use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use metrics_core::MetricRecord;
use metrics_storage::MetricValue;
use tokio_util::sync::CancellationToken;

use crate::errors::{map_json_rejection, ApiError};
use crate::state::AppState;

fn to_storage_value(record: &MetricRecord) -> MetricValue {
    match record.kind {
        metrics_core::MetricKind::Gauge => MetricValue::Gauge(record.value.unwrap_or_default()),
        metrics_core::MetricKind::Counter => MetricValue::Counter(record.delta.unwrap_or_default()),
    }
}

fn from_storage_value(id: String, value: MetricValue) -> MetricRecord {
    match value {
        MetricValue::Gauge(v) => MetricRecord::gauge(id, v),
        MetricValue::Counter(v) => MetricRecord::counter(id, v),
    }
}

pub(crate) async fn write_record(state: &AppState, mut record: MetricRecord) -> Result<MetricRecord, ApiError> {
    record.validate_shape()?;
    state.signature.verify(&record)?;

    let cancel = CancellationToken::new();
    state
        .storage
        .store(&cancel, &record.id, to_storage_value(&record))
        .await?;
    let stored = state.storage.load(&cancel, record.kind, &record.id).await?;

    let mut echoed = from_storage_value(record.id, stored);
    echoed.hash = state.signature.sign(&echoed);
    Ok(echoed)
}

/// `POST /update/`: single structured write, echoing the post-write value.
pub(crate) async fn update_single(
    State(state): State<AppState>,
    payload: Result<Json<MetricRecord>, JsonRejection>,
) -> Result<Json<MetricRecord>, ApiError> {
    let Json(record) = payload.map_err(map_json_rejection)?;
    let echoed = write_record(&state, record).await?;
    Ok(Json(echoed))
}

/// `POST /updates/`: batch structured write. Ordering within the array
/// defines effective write order; an empty array is a no-op 200.
pub(crate) async fn update_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<MetricRecord>>, JsonRejection>,
) -> Result<Json<Vec<MetricRecord>>, ApiError> {
    let Json(records) = payload.map_err(map_json_rejection)?;
    let mut echoed = Vec::with_capacity(records.len());
    for record in records {
        echoed.push(write_record(&state, record).await?);
    }
    Ok(Json(echoed))
}

/// `POST /value/`: structured read. The request carries id+kind with
/// delta/value empty; shape validation does not apply here since the record
/// is a query, not a write.
pub(crate) async fn value(
    State(state): State<AppState>,
    payload: Result<Json<MetricRecord>, JsonRejection>,
) -> Result<Json<MetricRecord>, ApiError> {
    let Json(query) = payload.map_err(map_json_rejection)?;
    let cancel = CancellationToken::new();
    let stored = state.storage.load(&cancel, query.kind, &query.id).await?;
    let mut record = from_storage_value(query.id, stored);
    record.hash = state.signature.sign(&record);
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_core::SignatureService;
    use metrics_storage::MemoryStorage;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(Arc::new(MemoryStorage::new(None)), SignatureService::new(Vec::new()), None)
    }

    #[tokio::test]
    async fn batch_writes_apply_in_array_order() {
        let state = state();
        let records = vec![
            MetricRecord::gauge("A", 1.0),
            MetricRecord::counter("C", 1),
            MetricRecord::gauge("A", 2.0),
            MetricRecord::counter("C", 2),
        ];
        update_batch(State(state.clone()), Ok(Json(records))).await.unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(
            state.storage.load(&cancel, metrics_core::MetricKind::Gauge, "A").await.unwrap(),
            MetricValue::Gauge(2.0)
        );
        assert_eq!(
            state.storage.load(&cancel, metrics_core::MetricKind::Counter, "C").await.unwrap(),
            MetricValue::Counter(3)
        );
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let state = state();
        let result = update_batch(State(state), Ok(Json(Vec::new()))).await.unwrap();
        assert!(result.0.is_empty());
    }

    #[tokio::test]
    async fn rejects_gauge_record_with_delta_set() {
        let state = state();
        let mut record = MetricRecord::gauge("A", 1.0);
        record.delta = Some(1);
        let error = update_single(State(state), Ok(Json(record))).await.unwrap_err();
        let _ = error;
    }

    #[tokio::test]
    async fn rejects_missing_signature_when_key_configured() {
        let state = AppState::new(
            Arc::new(MemoryStorage::new(None)),
            SignatureService::new(b"k".to_vec()),
            None,
        );
        let record = MetricRecord::gauge("A", 1.0);
        let result = update_single(State(state), Ok(Json(record))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_valid_signature() {
        let signature = SignatureService::new(b"k".to_vec());
        let mut record = MetricRecord::gauge("A", 1.0);
        record.hash = signature.sign(&record);
        let state = AppState::new(Arc::new(MemoryStorage::new(None)), signature, None);
        let result = update_single(State(state), Ok(Json(record))).await;
        assert!(result.is_ok());
    }
}
