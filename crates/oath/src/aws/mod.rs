//! Object storage access for key provisioning.
//!
//! [`ObjectStore`] is the only capability the rest of the service needs from
//! AWS: download one named object from a bucket into a local file.
//! [`S3Store`] implements it with the AWS SDK.

pub mod clients;
pub mod store;

pub use clients::s3_client;
pub use store::{ObjectStore, S3Store, StoreError};
