//! gossian-server: Remote Gaussian blur over TCP.
//!
//! [`serve`] accepts connections and runs one [`session`] task per
//! connection. Sessions share nothing but the configuration and a
//! process-wide shutdown signal: the first session that receives the
//! shutdown control message flips it, the accept loop stops, in-flight
//! sessions are aborted and [`serve`] returns. Aborting a session
//! cancels its blur, so the worker threads wind down with it.
//!
//! At most `config.max_concurrent_blurs` blurs run at once; further
//! sessions wait for a slot after reading their request.

pub mod config;
pub mod session;

use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use config::ServerConfig;
pub use session::{SessionError, SessionOutcome, handle_connection};

/// Bind `config.addr`.
///
/// # Errors
///
/// Returns the bind error, e.g. when the address is in use.
pub async fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(&config.addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accept connections on `listener` until a client requests shutdown.
///
/// Errors inside a session are logged and never stop the server, and
/// neither do failed accepts.
pub async fn serve(listener: TcpListener, config: ServerConfig) {
    let blur_slots = Arc::new(Semaphore::new(
        config.max_concurrent_blurs.clamp(1, Semaphore::MAX_PERMITS),
    ));
    let config = Arc::new(config);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                debug!(%peer, "connection accepted");

                let config = Arc::clone(&config);
                let blur_slots = Arc::clone(&blur_slots);
                let shutdown_tx = shutdown_tx.clone();
                sessions.spawn(async move {
                    match handle_connection(stream, &config, &blur_slots, peer).await {
                        Ok(SessionOutcome::Shutdown) => {
                            shutdown_tx.send_replace(true);
                        }
                        Ok(SessionOutcome::Replied { bytes }) => {
                            debug!(%peer, bytes, "connection closed");
                        }
                        Err(e) => {
                            warn!(%peer, kind = ?e.kind(), error = %e, "session failed");
                        }
                    }
                });
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!(error = %e, "session task panicked");
                }
            }
        }
    }

    let in_flight = sessions.len();
    blur_slots.close();
    sessions.abort_all();
    while sessions.join_next().await.is_some() {}
    info!(aborted = in_flight, "server stopped");
}
