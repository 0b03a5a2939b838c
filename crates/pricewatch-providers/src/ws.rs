//! Shared WebSocket session plumbing.
//!
//! Each provider socket runs as a sequence of sessions inside
//! [`supervise`]: connect, stream until something breaks, then back off
//! and try again. Only an explicit stop or a closed event channel ends
//! the loop; transient failures never surface past it.

use std::future::Future;
use std::time::Duration;

use pricewatch_core::error::ProviderError;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::backoff::ExponentialBackoff;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Session length after which the backoff counter resets.
pub(crate) const STABLE_CONNECTION_THRESHOLD: Duration = Duration::from_secs(300);

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a session ended.
pub(crate) enum SessionEnd {
    /// Stop was requested; leave the supervise loop.
    Shutdown,
    /// The engine went away; reconnecting is pointless.
    ChannelClosed,
    /// Transient failure; reconnect after backoff.
    Lost {
        error: ProviderError,
        /// How long the session was connected, when it got that far.
        connected_for: Option<Duration>,
    },
}

/// Resolve once the shutdown flag is raised or the sender is dropped.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Connect with a timeout, bailing out early on shutdown.
pub(crate) async fn connect(
    url: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<WsStream, SessionEnd> {
    tokio::select! {
        biased;

        _ = shutdown_requested(shutdown) => Err(SessionEnd::Shutdown),

        result = tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url)) => match result {
            Ok(Ok((stream, _))) => Ok(stream),
            Ok(Err(e)) => Err(SessionEnd::Lost {
                error: ProviderError::WebSocket(e.to_string()),
                connected_for: None,
            }),
            Err(_) => Err(SessionEnd::Lost {
                error: ProviderError::Connection("connection timeout".to_string()),
                connected_for: None,
            }),
        }
    }
}

/// Run sessions forever with exponential backoff between attempts.
pub(crate) async fn supervise<F, Fut>(
    label: &'static str,
    mut shutdown: watch::Receiver<bool>,
    mut session: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = SessionEnd>,
{
    let mut backoff = ExponentialBackoff::default();
    loop {
        if *shutdown.borrow() {
            break;
        }
        match session().await {
            SessionEnd::Shutdown => break,
            SessionEnd::ChannelClosed => {
                info!(socket = label, "Event channel closed, stopping socket");
                break;
            }
            SessionEnd::Lost {
                error,
                connected_for,
            } => {
                if connected_for.is_some_and(|d| d >= STABLE_CONNECTION_THRESHOLD) {
                    backoff.reset();
                }
                let delay = backoff.next_delay();
                warn!(
                    socket = label,
                    error = %error,
                    attempt = backoff.attempt(),
                    delay_secs = delay.as_secs_f64(),
                    "Connection lost, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        }
    }
    info!(socket = label, "Socket stopped");
}
