use std::time::Duration;

use metrics_core::MetricRecord;
use metrics_proto::metrics_ingest_client::MetricsIngestClient;
use metrics_proto::UpdateBatchRequest;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::warn;

use crate::error::TransportError;

const REAL_IP: &str = "127.0.0.1";

/// The agent's delivery path to the collector's `/updates/` route (or its
/// gRPC equivalent), selected at startup by the `-grpc`/`GRPC` flag (§4.14).
pub enum Transport {
    Http(HttpTransport),
    Grpc(GrpcTransport),
}

impl Transport {
    pub async fn send_batch(&self, records: Vec<MetricRecord>) -> Result<(), TransportError> {
        match self {
            Transport::Http(transport) => transport.send_batch(records).await,
            Transport::Grpc(transport) => transport.send_batch(records).await,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    updates_url: String,
}

impl HttpTransport {
    pub fn plain(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(TransportError::from)?;
        Ok(HttpTransport { client, updates_url: format!("{base_url}/updates/") })
    }

    pub fn with_tls(
        base_url: &str,
        root_ca: reqwest::Certificate,
        identity: Option<reqwest::Identity>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(10))
            .add_root_certificate(root_ca);
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        let client = builder.build().map_err(TransportError::from)?;
        Ok(HttpTransport { client, updates_url: format!("{base_url}/updates/") })
    }

    async fn send_batch(&self, records: Vec<MetricRecord>) -> Result<(), TransportError> {
        self.client
            .post(&self.updates_url)
            .header("X-Real-IP", REAL_IP)
            .json(&records)
            .send()
            .await?
            .error_for_status()
            .map_err(|error| {
                warn!(error = %error, "report delivery rejected by collector");
                error
            })?;
        Ok(())
    }
}

pub struct GrpcTransport {
    client: MetricsIngestClient<Channel>,
}

impl GrpcTransport {
    pub async fn connect(endpoint_url: &str) -> Result<Self, TransportError> {
        let endpoint = Endpoint::from_shared(endpoint_url.to_string())
            .map_err(|error| TransportError::Tls(error.to_string()))?
            .timeout(Duration::from_secs(10));
        let channel = endpoint.connect().await.map_err(|error| TransportError::Tls(error.to_string()))?;
        Ok(GrpcTransport { client: MetricsIngestClient::new(channel) })
    }

    pub async fn connect_with_tls(
        endpoint_url: &str,
        tls_config: ClientTlsConfig,
    ) -> Result<Self, TransportError> {
        let endpoint = Endpoint::from_shared(endpoint_url.to_string())
            .map_err(|error| TransportError::Tls(error.to_string()))?
            .tls_config(tls_config)
            .map_err(|error| TransportError::Tls(error.to_string()))?
            .timeout(Duration::from_secs(10));
        let channel = endpoint.connect().await.map_err(|error| TransportError::Tls(error.to_string()))?;
        Ok(GrpcTransport { client: MetricsIngestClient::new(channel) })
    }

    async fn send_batch(&self, records: Vec<MetricRecord>) -> Result<(), TransportError> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(UpdateBatchRequest {
            records: records.into_iter().map(Into::into).collect(),
        });
        request.metadata_mut().insert("x-real-ip", REAL_IP.parse().expect("static header value"));
        client.update_batch(request).await?;
        Ok(())
    }
}
