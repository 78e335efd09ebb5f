use std::net::IpAddr;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::ApiError;
use crate::state::AppState;

const REAL_IP_HEADER: &str = "x-real-ip";

fn real_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Same lookup as [`real_ip`], for the gRPC transport's metadata map.
pub(crate) fn real_ip_from_metadata(metadata: &tonic::metadata::MetadataMap) -> Option<IpAddr> {
    metadata
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Rejects any request whose advertised `X-Real-IP` does not lie within the
/// configured trusted subnet. A no-op when no subnet is configured.
pub(crate) async fn source_ip_gate(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(subnet) = state.trusted_subnet else {
        return Ok(next.run(request).await);
    };

    let ip = real_ip(request.headers());
    let allowed = ip.is_some_and(|ip| subnet.contains(&ip));
    if !allowed {
        return Err(ApiError::forbidden(
            "request source IP is not within the trusted subnet",
        ));
    }

    Ok(next.run(request).await)
}
