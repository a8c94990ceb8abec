//! Service startup, serving, and shutdown.
//!
//! ```text
//! Init ─▶ KeysProvisioned ─▶ RoutesRegistered ─▶ Serving ─▶ Draining ─▶ Terminated
//!   └──────── provisioning failed ───────────────────────────────────────▶ Terminated
//! ```
//!
//! Provisioning completes before any listener is bound or adopted, so no
//! route ever runs without both key files.

use anyhow::{Context, Result};
use axum::Router;
use common::ApiConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::{v1::V1, ApiRouter};
use crate::aws::{s3_client, ObjectStore, S3Store};
use crate::config::ServiceConfig;
use crate::keys::{self, ProvisionError};
use crate::server::{
    restart, router,
    serve::{self, Signals},
    state::AppState,
};

/// Lifecycle stage, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    KeysProvisioned,
    RoutesRegistered,
    Serving,
    Draining,
    Terminated,
}

/// Provision the key pair, then build the full router around it.
///
/// # Errors
///
/// Returns the provisioning error; `api` is never consulted in that case.
pub async fn prepare<S, A>(cfg: &ServiceConfig, store: &S, api: &A) -> Result<Router, ProvisionError>
where
    S: ObjectStore + ?Sized,
    A: ApiRouter + ?Sized,
{
    let key_pair = keys::provision(
        store,
        &cfg.token_bucket,
        &cfg.scratch_dir,
        cfg.key_names(),
    )
    .await?;
    info!(stage = ?Stage::KeysProvisioned, bucket = %cfg.token_bucket, "keys provisioned");

    let api_cfg = ApiConfig {
        key_pair,
        aws_region: cfg.aws_region.clone(),
    };
    let app = router::build(AppState::default(), &cfg.cors_origins, api, &api_cfg);
    info!(stage = ?Stage::RoutesRegistered, "routes registered");

    Ok(app)
}

/// Run the service until a shutdown signal, or until a successor took over.
///
/// # Errors
///
/// Returns an error if provisioning fails (before any port is bound), if the
/// listener cannot be bound or adopted, or if serving fails.
pub async fn run(cfg: ServiceConfig) -> Result<()> {
    info!(
        stage = ?Stage::Init,
        port = cfg.port,
        region = %cfg.aws_region,
        bucket = %cfg.token_bucket,
        "oath starting"
    );

    let store = S3Store::new(s3_client(&cfg).await);
    let app = match prepare(&cfg, &store, &V1).await {
        Ok(app) => app,
        Err(e) => {
            let err = anyhow::Error::new(e).context("download token files failed, fatal");
            error!(stage = ?Stage::Terminated, error = %format!("{err:#}"), "startup aborted");
            return Err(err);
        }
    };

    let listener = match restart::inherited_listener().context("failed to adopt inherited listener")? {
        Some(listener) => {
            info!("adopted listener from predecessor");
            listener
        }
        None => std::net::TcpListener::bind(("0.0.0.0", cfg.port))
            .with_context(|| format!("failed to bind port {}", cfg.port))?,
    };
    let handoff = listener.try_clone()?;
    listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(listener)?;
    let signals = Signals::install().context("failed to install signal handlers")?;

    if restart::notify_ready()
        .await
        .context("failed to notify predecessor")?
    {
        info!("predecessor notified");
    }

    info!(stage = ?Stage::Serving, addr = %listener.local_addr()?, "serving");
    let restart_timeout = cfg.restart_timeout();
    serve::serve_until(listener, app, async move {
        serve::stop_requested(signals, handoff, restart_timeout).await;
        info!(stage = ?Stage::Draining, "no longer accepting connections");
    })
    .await?;

    info!(stage = ?Stage::Terminated, "oath stopped");
    Ok(())
}
