//! Common types, key material descriptors, and errors shared across `oath` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::{ApiConfig, ErrorResponse, KeyPair};
