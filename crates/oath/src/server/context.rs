//! Per-request correlation state injected by the correlation middleware.

use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

/// Correlation identifier and start instant of one request.
///
/// Inserted as a request extension by [`super::middleware::correlation`];
/// handlers read it with `Extension<RequestContext>`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: String,
    started: Instant,
}

impl RequestContext {
    /// Fresh context with a random (v4) identifier, started now.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the time spent so far. Handlers call this right before replying.
    pub fn log_elapsed(&self) {
        info!(
            correlation_id = %self.correlation_id,
            delta = ?self.elapsed(),
            "elapsed"
        );
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
