//! Shared application state injected into the status handlers.

use std::sync::Arc;

/// State shared across the status handlers.
///
/// Cheap to clone: Axum clones it for every request.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Version reported by `GET /version` and the `Server` header.
    pub version: Arc<String>,
}

impl AppState {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: Arc::new(version.into()),
        }
    }
}

impl Default for AppState {
    /// State reporting the crate version.
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}
