//! Token key provisioning.
//!
//! # Lifecycle
//!
//! 1. At startup, [`provision`] makes sure the scratch directory exists,
//!    creating it owner-only (`0700`) when missing.
//! 2. The private key, then the public key, are downloaded from the token
//!    bucket into `<scratch_dir>/<name>`.
//! 3. The resulting [`KeyPair`] is handed to the API routes and never changes.
//!
//! # Invariants
//!
//! - Either both files are materialised or an error is returned; callers must
//!   not start serving on error.
//! - No retry. The first failure is returned as-is.
//! - An existing scratch directory is reused without touching its permissions.
//! - Key files are owner-only (`0600`) and synced to disk before
//!   [`provision`] returns, whatever the [`ObjectStore`] did with them.

pub mod error;

pub use error::{FetchFailure, ProvisionError};

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use common::KeyPair;
use tokio::fs::{self, DirBuilder, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::aws::ObjectStore;

/// Permissions applied to a freshly created scratch directory.
pub const SCRATCH_DIR_MODE: u32 = 0o700;

/// Permissions of every downloaded key file.
pub const KEY_FILE_MODE: u32 = 0o600;

/// Download the `[private, public]` key objects from `bucket` into `scratch_dir`.
///
/// # Errors
///
/// Returns [`ProvisionError::Directory`] if the scratch directory cannot be
/// created and [`ProvisionError::Fetch`] on the first file that cannot be
/// created or downloaded. Remaining downloads are skipped.
pub async fn provision<S>(
    store: &S,
    bucket: &str,
    scratch_dir: &Path,
    [private_name, public_name]: [&str; 2],
) -> Result<KeyPair, ProvisionError>
where
    S: ObjectStore + ?Sized,
{
    ensure_scratch_dir(scratch_dir).await?;

    for name in [private_name, public_name] {
        fetch_one(store, bucket, scratch_dir, name).await?;
    }

    let pair = KeyPair {
        private_key_path: scratch_dir.join(private_name),
        public_key_path: scratch_dir.join(public_name),
    };
    info!(
        public_key = %pair.public_key_path.display(),
        private_key = %pair.private_key_path.display(),
        "key pair provisioned"
    );
    Ok(pair)
}

async fn ensure_scratch_dir(dir: &Path) -> Result<(), ProvisionError> {
    if matches!(fs::try_exists(dir).await, Ok(true)) {
        debug!(dir = %dir.display(), "scratch directory exists");
        return Ok(());
    }

    DirBuilder::new()
        .recursive(true)
        .mode(SCRATCH_DIR_MODE)
        .create(dir)
        .await
        .map_err(|source| ProvisionError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

    debug!(dir = %dir.display(), "scratch directory created");
    Ok(())
}

async fn fetch_one<S>(store: &S, bucket: &str, dir: &Path, name: &str) -> Result<(), ProvisionError>
where
    S: ObjectStore + ?Sized,
{
    let path = dir.join(name);
    let fail = |source: FetchFailure| ProvisionError::Fetch {
        key: name.to_owned(),
        path: path.clone(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(KEY_FILE_MODE)
        .open(&path)
        .await
        .map_err(|e| fail(FetchFailure::Create(e)))?;
    // `mode` only applies to new files; a leftover from an earlier run keeps its own.
    file.set_permissions(Permissions::from_mode(KEY_FILE_MODE))
        .await
        .map_err(|e| fail(FetchFailure::Create(e)))?;

    let bytes = store
        .download(bucket, name, &mut file)
        .await
        .map_err(|e| fail(FetchFailure::Download(e)))?;

    file.flush()
        .await
        .map_err(|e| fail(FetchFailure::Persist(e)))?;
    file.sync_all()
        .await
        .map_err(|e| fail(FetchFailure::Persist(e)))?;

    info!(bucket, key = name, bytes, "downloaded key file");
    Ok(())
}
