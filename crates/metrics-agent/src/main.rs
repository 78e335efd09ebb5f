#![forbid(unsafe_code)]
//! Telemetry agent.
//!
//! Samples process and host metrics on a fixed interval, then reports them
//! to the collector over HTTP(S) or gRPC on a separate, coarser interval.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod lifecycle;
mod metrics;
mod rate_limiter;
mod reporter;
mod samplers;
mod tls;
mod transport;

use crate::config::{AgentConfig, CliArgs};
use crate::metrics::AgentMetrics;
use crate::rate_limiter::RateLimiter;
use crate::tls::ClientTlsMaterial;
use crate::transport::{GrpcTransport, HttpTransport, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = CliArgs::parse();
    let config = AgentConfig::load(&cli).context("invalid agent configuration")?;

    tracing::info!(
        address = %config.address,
        poll_interval = ?config.poll_interval,
        report_interval = ?config.report_interval,
        rate_limit = config.rate_limit,
        grpc = config.grpc,
        signing_enabled = !config.key.is_empty(),
        tls_enabled = config.crypto_key_dir.is_some(),
        "agent starting"
    );

    let transport = Arc::new(build_transport(&config).await.context("failed to build transport")?);
    let signature = Arc::new(metrics_core::SignatureService::new(config.key.clone().into_bytes()));
    let agent_metrics = Arc::new(AgentMetrics::new());
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let cancel = CancellationToken::new();

    let runtime_sampler = tokio::spawn(samplers::run_runtime_sampler(
        agent_metrics.clone(),
        limiter.clone(),
        config.poll_interval,
        cancel.clone(),
    ));
    let host_sampler = tokio::spawn(samplers::run_host_sampler(
        agent_metrics.clone(),
        limiter.clone(),
        config.poll_interval,
        cancel.clone(),
    ));
    let reporter = tokio::spawn(reporter::run_reporter(
        agent_metrics.clone(),
        transport.clone(),
        signature.clone(),
        config.report_interval,
        cancel.clone(),
    ));

    lifecycle::shutdown_signal().await;
    tracing::info!("agent shutting down");
    cancel.cancel();

    let _ = tokio::join!(runtime_sampler, host_sampler, reporter);

    Ok(())
}

/// Picks HTTP(S) or gRPC based on `--grpc`, and adds client TLS material
/// when `--crypto-key` names a directory.
async fn build_transport(config: &AgentConfig) -> Result<Transport> {
    let tls_material = config.crypto_key_dir.as_deref().map(ClientTlsMaterial::from_dir);

    if config.grpc {
        let endpoint = format!("http://{}", config.address);
        let transport = match &tls_material {
            Some(material) => {
                let tls_config = material.tonic_tls_config().await.context("failed to load gRPC client TLS material")?;
                let endpoint = format!("https://{}", config.address);
                GrpcTransport::connect_with_tls(&endpoint, tls_config)
                    .await
                    .context("failed to connect to collector over gRPC+TLS")?
            }
            None => GrpcTransport::connect(&endpoint)
                .await
                .context("failed to connect to collector over gRPC")?,
        };
        return Ok(Transport::Grpc(transport));
    }

    let transport = match &tls_material {
        Some(material) => {
            let (root_ca, identity) =
                material.reqwest_material().await.context("failed to load HTTPS client TLS material")?;
            let base_url = format!("https://{}", config.address);
            HttpTransport::with_tls(&base_url, root_ca, identity)?
        }
        None => {
            let base_url = format!("http://{}", config.address);
            HttpTransport::plain(&base_url)?
        }
    };
    Ok(Transport::Http(transport))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}
