use metrics_core::MetricRecord;
use metrics_proto::metrics_ingest_server::{MetricsIngest, MetricsIngestServer};
use metrics_proto::{PingRequest, PingResponse, UpdateBatchRequest, UpdateBatchResponse};
use tonic::{Request, Response, Status};

use crate::handlers::structured::write_record;
use crate::ingress::real_ip_from_metadata;
use crate::state::AppState;

pub(crate) struct MetricsIngestService {
    state: AppState,
}

impl MetricsIngestService {
    pub(crate) fn into_server(state: AppState) -> MetricsIngestServer<Self> {
        MetricsIngestServer::new(Self { state })
            .send_compressed(tonic::codec::CompressionEncoding::Gzip)
            .accept_compressed(tonic::codec::CompressionEncoding::Gzip)
    }

    fn check_subnet(&self, request: &Request<impl Send>) -> Result<(), Status> {
        let Some(subnet) = self.state.trusted_subnet else {
            return Ok(());
        };
        let allowed = real_ip_from_metadata(request.metadata())
            .is_some_and(|ip| subnet.contains(&ip));
        if allowed {
            Ok(())
        } else {
            Err(Status::permission_denied(
                "request source IP is not within the trusted subnet",
            ))
        }
    }
}

#[tonic::async_trait]
impl MetricsIngest for MetricsIngestService {
    async fn update_batch(
        &self,
        request: Request<UpdateBatchRequest>,
    ) -> Result<Response<UpdateBatchResponse>, Status> {
        self.check_subnet(&request)?;
        let batch = request.into_inner();

        let mut records = Vec::with_capacity(batch.records.len());
        for proto_record in batch.records {
            let record: MetricRecord = proto_record
                .try_into()
                .map_err(|error: String| Status::invalid_argument(error))?;
            let echoed = write_record(&self.state, record)
                .await
                .map_err(|error| Status::invalid_argument(error.to_string()))?;
            records.push(echoed.into());
        }

        Ok(Response::new(UpdateBatchResponse { records }))
    }

    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        self.check_subnet(&request)?;
        let ok = self.state.is_relational
            && self
                .state
                .storage
                .ping(&tokio_util::sync::CancellationToken::new())
                .await
                .is_ok();
        Ok(Response::new(PingResponse { ok }))
    }
}
