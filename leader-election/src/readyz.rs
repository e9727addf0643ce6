//! Health-check view of leadership.

use std::sync::OnceLock;

use axum::http::StatusCode;
use tracing::warn;

use crate::state::ElectionHandle;

/// Axum-compatible readiness check reporting whether this process currently
/// leads. Constructed before the election handle exists and bound once the
/// coordinator is built; until then it reports not-ready.
#[derive(Debug, Default)]
pub struct ReadyzAdaptor {
    handle: OnceLock<ElectionHandle>,
}

impl ReadyzAdaptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate the election handle. Only the first binding takes effect.
    pub fn bind(&self, handle: ElectionHandle) {
        if self.handle.set(handle).is_err() {
            warn!("readyz adaptor already bound to an election handle, ignoring rebind");
        }
    }

    pub fn is_leading(&self) -> bool {
        self.handle.get().is_some_and(ElectionHandle::is_leading)
    }

    /// Returns OK while leading, SERVICE_UNAVAILABLE otherwise; no I/O.
    pub async fn check(&self) -> StatusCode {
        if self.is_leading() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
