use std::path::PathBuf;

use thiserror::Error;

use crate::aws::StoreError;

/// Errors produced while provisioning the key pair. Both are fatal at startup.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The scratch directory did not exist and could not be created.
    #[error("mkdir failed: {}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key file could not be created, downloaded into, or written out.
    #[error("fetch of {key} into {} failed", path.display())]
    Fetch {
        key: String,
        path: PathBuf,
        #[source]
        source: FetchFailure,
    },
}

/// Which half of a key fetch failed.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("create file failed")]
    Create(#[source] std::io::Error),

    #[error("download failed")]
    Download(#[source] StoreError),

    #[error("writing file to disk failed")]
    Persist(#[source] std::io::Error),
}
