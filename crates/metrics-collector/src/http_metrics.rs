use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Access logging. Applied as the last `.layer()` in the router's stack,
/// which makes it the outermost layer: it runs before and observes every
/// request, including ones later rejected by the source-IP gate or
/// signature checks further in.
pub(crate) async fn track_http_metrics(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );

    response
}
