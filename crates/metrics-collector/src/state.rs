use std::sync::Arc;
use std::time::Instant;

use ipnet::IpNet;
use metrics_core::SignatureService;
use metrics_storage::StorageEngine;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) started_at: Instant,
    pub(crate) storage: Arc<dyn StorageEngine>,
    /// `/ping` only ever succeeds against the relational backend (per the
    /// route's contract); the in-memory variant is always reported down.
    pub(crate) is_relational: bool,
    pub(crate) signature: Arc<SignatureService>,
    pub(crate) trusted_subnet: Option<IpNet>,
}

impl AppState {
    pub(crate) fn new(
        storage: Arc<dyn StorageEngine>,
        signature: SignatureService,
        trusted_subnet: Option<IpNet>,
    ) -> Self {
        Self::with_backend_kind(storage, signature, trusted_subnet, false)
    }

    pub(crate) fn with_backend_kind(
        storage: Arc<dyn StorageEngine>,
        signature: SignatureService,
        trusted_subnet: Option<IpNet>,
        is_relational: bool,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            storage,
            is_relational,
            signature: Arc::new(signature),
            trusted_subnet,
        }
    }
}
