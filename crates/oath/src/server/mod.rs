//! Axum HTTP server, instrumentation chain, and restart handling.
//!
//! # Responsibilities
//! - Build the router: status routes, the versioned API, the 404 fallback.
//! - Wrap it in the request instrumentation chain (`middleware`).
//! - Serve on a bound or inherited listener until shutdown or restart (`serve`).
//! - Hand the listening socket to a successor process on restart (`restart`).

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod restart;
pub mod router;
pub mod serve;
pub mod state;
