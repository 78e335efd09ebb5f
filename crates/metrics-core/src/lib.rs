#![forbid(unsafe_code)]
//! Wire model and signature primitives shared by the metrics agent and collector.
//!
//! Kept dependency-light and free of any transport or storage concern: this
//! crate only knows how to describe a metric record and sign/verify it.

pub mod error;
pub mod metric;
pub mod signature;

pub use error::ModelError;
pub use metric::{MetricKind, MetricRecord};
pub use signature::SignatureService;
