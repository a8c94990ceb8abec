//! Versioned API routes.
//!
//! The bootstrap only knows the [`ApiRouter`] seam: given the router built so
//! far and an [`ApiConfig`] (provisioned key pair plus region), return the
//! router with the API mounted. `v1` is the implementation the binary ships.

pub mod v1;

use axum::Router;
use common::ApiConfig;

/// Mounts versioned API routes onto the service router.
pub trait ApiRouter: Send + Sync {
    fn mount(&self, router: Router, cfg: &ApiConfig) -> Router;
}
