use std::error::Error;
use std::fmt;

/// Errors surfaced by the agent's transport layer. Configuration errors are
/// handled at the CLI boundary via `anyhow`, matching the collector; this
/// type covers the recoverable, per-report failures the reporter logs and
/// continues past (§7, "Transport error").
#[derive(Debug)]
pub enum TransportError {
    Http(reqwest::Error),
    Grpc(tonic::Status),
    Tls(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Http(error) => write!(f, "http transport error: {error}"),
            TransportError::Grpc(status) => write!(f, "grpc transport error: {status}"),
            TransportError::Tls(message) => write!(f, "tls configuration error: {message}"),
        }
    }
}

impl Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        TransportError::Http(value)
    }
}

impl From<tonic::Status> for TransportError {
    fn from(value: tonic::Status) -> Self {
        TransportError::Grpc(value)
    }
}
