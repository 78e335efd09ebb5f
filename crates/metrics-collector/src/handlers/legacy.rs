use axum::extract::{Path, State};
use metrics_core::MetricKind;
use metrics_storage::MetricValue;
use tokio_util::sync::CancellationToken;

use crate::errors::ApiError;
use crate::state::AppState;

/// `POST /update/{kind}/{id}/{value}`. Malformed value -> 400, unknown kind
/// -> 501. Response is the JSON-encoded post-write value (echo-back).
pub(crate) async fn update(
    Path((kind, id, value)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> Result<String, ApiError> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|_| ApiError::unknown_kind(format!("unknown metric kind '{kind}'")))?;
    let metric_value = parse_value(kind, &value)?;

    let cancel = CancellationToken::new();
    state.storage.store(&cancel, &id, metric_value).await?;
    let stored = state.storage.load(&cancel, kind, &id).await?;
    Ok(render_value(stored))
}

/// `GET /value/{kind}/{id}`. 404 if absent, 501 if the kind segment is
/// unrecognized. Plain-text response.
pub(crate) async fn value(
    Path((kind, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<String, ApiError> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|_| ApiError::unknown_kind(format!("unknown metric kind '{kind}'")))?;
    let cancel = CancellationToken::new();
    let stored = state.storage.load(&cancel, kind, &id).await?;
    Ok(render_value(stored))
}

fn parse_value(kind: MetricKind, raw: &str) -> Result<MetricValue, ApiError> {
    match kind {
        MetricKind::Gauge => raw
            .parse::<f64>()
            .map(MetricValue::Gauge)
            .map_err(|_| ApiError::invalid_argument(format!("'{raw}' is not a valid gauge value"))),
        MetricKind::Counter => raw
            .parse::<i64>()
            .map(MetricValue::Counter)
            .map_err(|_| ApiError::invalid_argument(format!("'{raw}' is not a valid counter value"))),
    }
}

fn render_value(value: MetricValue) -> String {
    match value {
        MetricValue::Gauge(v) => format!("{v}"),
        MetricValue::Counter(v) => format!("{v}"),
    }
}
