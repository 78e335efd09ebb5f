//! Telemetry collector server.
//!
//! Exposes:
//! - `GET /`: HTML listing of every known metric id
//! - `GET /ping`: liveness, relational-backend reachability
//! - `GET /debug/pprof/profile`: CPU flamegraph capture
//! - `POST /update/{kind}/{id}/{value}`, `GET /value/{kind}/{id}`: legacy
//!   path-encoded single-metric routes
//! - `POST /update/`, `POST /updates/`, `POST /value/`: structured JSON routes
//!
//! Exactly one transport is active per process: HTTP, HTTPS, or gRPC,
//! selected by configuration (`-grpc`/`GRPC` plus `-crypto-key`/`CRYPTO_KEY`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderName, Request};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use metrics_core::SignatureService;
use metrics_storage::{MemoryStorage, PostgresStorage, SnapshotCoordinator, StorageEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod grpc;
mod handlers;
mod ingress;
mod lifecycle;
mod http_metrics;
mod state;
mod tls;
#[cfg(test)]
mod tests;

use crate::config::{CliArgs, CollectorConfig};
use crate::errors::handle_middleware_error;
use crate::grpc::MetricsIngestService;
use crate::handlers::{index, legacy, structured};
use crate::http_metrics::track_http_metrics;
use crate::ingress::source_ip_gate;
use crate::state::AppState;
use crate::tls::TlsMaterial;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = CliArgs::parse();
    let config = CollectorConfig::load(&cli).context("invalid collector configuration")?;

    tracing::info!(
        bind = %config.bind,
        store_interval = ?config.store_interval,
        restore = config.restore,
        relational = config.database_dsn.is_some(),
        grpc = config.grpc,
        tls_enabled = config.crypto_key_dir.is_some(),
        "collector starting"
    );

    let cancel = CancellationToken::new();
    let (storage, is_relational, coordinator_handle) = build_storage(&config, cancel.clone()).await?;

    let signature = SignatureService::new(config.key.clone().into_bytes());
    let state = AppState::with_backend_kind(storage, signature, config.trusted_subnet, is_relational);

    let shutdown_cancel = cancel.clone();
    let shutdown = async move {
        lifecycle::shutdown_signal().await;
        tracing::info!("collector shutting down");
        shutdown_cancel.cancel();
    };

    if config.grpc {
        serve_grpc(&config, state, shutdown).await?;
    } else {
        let app = build_app(state);
        match &config.crypto_key_dir {
            Some(dir) => serve_https(&config, dir, app, shutdown).await?,
            None => serve_http(&config, app, shutdown).await?,
        }
    }

    if let Some(handle) = coordinator_handle {
        let _ = handle.await;
    }

    Ok(())
}

type StorageHandle = (Arc<dyn StorageEngine>, bool, Option<tokio::task::JoinHandle<()>>);

/// Picks the relational backend when a DSN is configured, otherwise
/// in-memory storage with a snapshot coordinator. Restoring happens before
/// the coordinator starts, onto the freshly constructed (empty) store.
async fn build_storage(config: &CollectorConfig, cancel: CancellationToken) -> Result<StorageHandle> {
    if let Some(dsn) = &config.database_dsn {
        let storage = PostgresStorage::connect(dsn)
            .await
            .context("failed to connect to the relational storage backend")?;
        return Ok((Arc::new(storage), true, None));
    }

    let signal_driven = config.store_interval.is_zero();
    let (dirty_tx, dirty_rx) = if signal_driven {
        let (tx, rx) = mpsc::channel(1);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let memory = Arc::new(MemoryStorage::new(dirty_tx));
    if config.restore {
        SnapshotCoordinator::restore(&memory, &config.store_file)
            .await
            .context("failed to restore snapshot")?;
    }

    let coordinator = Arc::new(SnapshotCoordinator::new(memory.clone(), config.store_file.clone()));
    let handle = if let Some(dirty_rx) = dirty_rx {
        tokio::spawn(coordinator.run_signal_driven(dirty_rx, cancel))
    } else {
        tokio::spawn(coordinator.run_periodic(config.store_interval, cancel))
    };

    Ok((memory, false, Some(handle)))
}

pub(crate) fn build_app(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");
    let http_metrics_layer = middleware::from_fn(track_http_metrics);
    let ingress_layer = middleware::from_fn_with_state(state.clone(), source_ip_gate);

    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new().gzip(true))
        .layer(RequestDecompressionLayer::new().gzip(true))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get(&request_id_header)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id
                    )
                })
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Millis)),
        );

    Router::new()
        .route("/", get(index::index))
        .route("/ping", get(index::ping))
        .route("/debug/pprof/profile", get(index::pprof_profile))
        .route("/update/:kind/:id/:value", post(legacy::update))
        .route("/value/:kind/:id", get(legacy::value))
        .route("/update/", post(structured::update_single))
        .route("/updates/", post(structured::update_batch))
        .route("/value/", post(structured::value))
        .layer(ingress_layer)
        .layer(middleware_stack)
        .layer(http_metrics_layer)
        .with_state(state)
}

async fn serve_http(config: &CollectorConfig, app: Router, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind server socket on {}", config.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server exited unexpectedly")
}

async fn serve_https(
    config: &CollectorConfig,
    crypto_key_dir: &Path,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let material = TlsMaterial::from_dir(crypto_key_dir);
    let rustls_config = material.rustls_config().await.context("failed to load TLS material")?;
    tracing::info!(mtls = material.mtls_enabled(), "serving HTTPS");

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    axum_server::bind_rustls(config.bind, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("HTTPS server exited unexpectedly")
}

async fn serve_grpc(
    config: &CollectorConfig,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let mut server = tonic::transport::Server::builder();

    if let Some(dir) = &config.crypto_key_dir {
        let tls_config = grpc_server_tls_config(dir).await.context("failed to load gRPC TLS material")?;
        server = server.tls_config(tls_config).context("failed to apply gRPC TLS configuration")?;
        tracing::info!("serving gRPC over TLS");
    } else {
        tracing::info!("serving gRPC over plaintext");
    }

    server
        .add_service(MetricsIngestService::into_server(state))
        .serve_with_shutdown(config.bind, shutdown)
        .await
        .context("gRPC server exited unexpectedly")
}

/// Builds the gRPC transport's TLS config from the same directory layout as
/// [`TlsMaterial`] (`server.crt`/`server.key`, optional `client-ca.crt` for
/// mTLS), using `tonic`'s own TLS types rather than `axum_server`'s.
async fn grpc_server_tls_config(dir: &Path) -> Result<tonic::transport::ServerTlsConfig> {
    let cert = tokio::fs::read(dir.join("server.crt")).await.context("failed to read server.crt")?;
    let key = tokio::fs::read(dir.join("server.key")).await.context("failed to read server.key")?;
    let identity = tonic::transport::Identity::from_pem(cert, key);
    let mut tls_config = tonic::transport::ServerTlsConfig::new().identity(identity);

    let client_ca_path = dir.join("client-ca.crt");
    if tokio::fs::try_exists(&client_ca_path).await.unwrap_or(false) {
        let client_ca = tokio::fs::read(&client_ca_path).await.context("failed to read client-ca.crt")?;
        tls_config = tls_config.client_ca_root(tonic::transport::Certificate::from_pem(client_ca));
    }

    Ok(tls_config)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}
