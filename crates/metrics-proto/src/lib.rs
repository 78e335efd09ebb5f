//! Generated gRPC stubs for the metrics ingest service, plus thin
//! conversions to and from [`metrics_core::MetricRecord`].

tonic::include_proto!("metrics");

use metrics_core::{MetricKind as CoreKind, MetricRecord as CoreRecord};

impl From<CoreRecord> for MetricRecord {
    fn from(record: CoreRecord) -> Self {
        let kind = match record.kind {
            CoreKind::Gauge => MetricKind::Gauge,
            CoreKind::Counter => MetricKind::Counter,
        };
        MetricRecord {
            id: record.id,
            kind: kind as i32,
            delta: record.delta,
            value: record.value,
            hash: record.hash,
        }
    }
}

impl TryFrom<MetricRecord> for CoreRecord {
    type Error = String;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        let kind = match MetricKind::try_from(record.kind) {
            Ok(MetricKind::Gauge) => CoreKind::Gauge,
            Ok(MetricKind::Counter) => CoreKind::Counter,
            Err(_) => return Err(format!("unknown gRPC metric kind tag {}", record.kind)),
        };
        Ok(CoreRecord {
            id: record.id,
            kind,
            delta: record.delta,
            value: record.value,
            hash: record.hash,
        })
    }
}
