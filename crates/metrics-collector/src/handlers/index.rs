use std::fmt::Write as _;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tokio_util::sync::CancellationToken;

use crate::errors::ApiError;
use crate::state::AppState;

/// `GET /`: HTML listing of known metric ids, gauges then counters.
pub(crate) async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let cancel = CancellationToken::new();
    let mut gauges: Vec<_> = state.storage.load_all_gauge(&cancel).await?.into_iter().collect();
    let mut counters: Vec<_> = state.storage.load_all_counter(&cancel).await?.into_iter().collect();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    counters.sort_by(|a, b| a.0.cmp(&b.0));

    let mut body = String::from("<html><body><h1>Metrics</h1><ul>");
    for (id, value) in gauges {
        let _ = write!(body, "<li>{id}: {value}</li>");
    }
    for (id, value) in counters {
        let _ = write!(body, "<li>{id}: {value}</li>");
    }
    body.push_str("</ul></body></html>");
    Ok(Html(body))
}

/// `GET /ping`: liveness plus relational backend reachability. The
/// in-memory variant always reports failure here, per the route's contract.
pub(crate) async fn ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    if !state.is_relational {
        return Err(ApiError::internal("storage backend is not relational"));
    }
    let cancel = CancellationToken::new();
    state.storage.ping(&cancel).await?;
    Ok("ok")
}

/// `GET /debug/pprof/profile`: a CPU flamegraph captured over a short window,
/// the Rust analogue of Go's `net/http/pprof` profile endpoint.
pub(crate) async fn pprof_profile() -> Result<Response, ApiError> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(100)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|error| ApiError::internal(format!("failed to start profiler: {error}")))?;

    tokio::time::sleep(Duration::from_secs(10)).await;

    let report = guard
        .report()
        .build()
        .map_err(|error| ApiError::internal(format!("failed to build profile report: {error}")))?;

    let mut body = Vec::new();
    report
        .flamegraph(&mut body)
        .map_err(|error| ApiError::internal(format!("failed to render flamegraph: {error}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/svg+xml")],
        body,
    )
        .into_response())
}
