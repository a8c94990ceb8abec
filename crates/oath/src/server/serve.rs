//! Serve loop, process signals, and the drain that follows them.
//!
//! - `SIGTERM` / `SIGINT`: stop accepting, drain in-flight requests, return.
//! - `SIGUSR2`: hand the listener to a successor ([`restart::hand_off`]);
//!   once it is ready, stop accepting and drain. A failed handoff is logged
//!   and the process keeps serving.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info};

use super::restart::{self, Successor};

/// Serve `app` on `listener` until `shutdown` resolves, then drain.
///
/// Returns once every in-flight connection has finished.
pub async fn serve_until<F>(listener: TcpListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Process signals the serve loop reacts to.
///
/// Installed before serving so a signal arriving early is not lost.
pub struct Signals {
    terminate: Signal,
    interrupt: Signal,
    restart: Signal,
}

impl Signals {
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            restart: signal(SignalKind::user_defined2())?,
        })
    }
}

/// Resolves when this process should stop accepting connections: on a
/// shutdown signal, or after a restart handed `listener` to a ready successor.
pub async fn stop_requested(
    signals: Signals,
    listener: std::net::TcpListener,
    restart_timeout: Duration,
) {
    stop_requested_with(signals, listener, restart_timeout, Successor::current).await
}

async fn stop_requested_with<F>(
    mut signals: Signals,
    listener: std::net::TcpListener,
    restart_timeout: Duration,
    successor: F,
) where
    F: Fn() -> io::Result<Successor>,
{
    loop {
        tokio::select! {
            _ = signals.terminate.recv() => {
                info!("SIGTERM received, draining connections");
                return;
            }
            _ = signals.interrupt.recv() => {
                info!("SIGINT received, draining connections");
                return;
            }
            _ = signals.restart.recv() => {
                info!("SIGUSR2 received, restarting");
                if restart_once(&listener, successor(), restart_timeout).await {
                    return;
                }
            }
        }
    }
}

async fn restart_once(
    listener: &std::net::TcpListener,
    successor: io::Result<Successor>,
    timeout: Duration,
) -> bool {
    let successor = match successor {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot locate own executable; restart aborted");
            return false;
        }
    };

    match restart::hand_off(listener, &successor, timeout).await {
        Ok(pid) => {
            info!(successor_pid = pid, "successor ready, draining connections");
            true
        }
        Err(e) => {
            error!(error = %e, "restart aborted; continuing to serve");
            false
        }
    }
}
