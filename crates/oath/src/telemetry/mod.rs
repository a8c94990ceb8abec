//! Logging and optional OTLP span export.
//!
//! Log lines are JSON on stdout. Inside a request every line carries the
//! `correlation_id` of the `request` span opened by the correlation middleware.
//!
//! # Telemetry invariants
//!
//! - **No key material** may appear in any span attribute or log field. Key
//!   file paths and byte counts are fine.
//! - Log level comes from `RUST_LOG` when set, else `OATH_LOG_LEVEL`
//!   (default: `info`).

pub mod init;

pub use init::init_telemetry;
