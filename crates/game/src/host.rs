use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::net::{Listener, SessionError, SessionEvent, SessionHandle, SessionId};
use crate::server::{GameServer, Outbound, Recipient, ServerConfig};

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    config: ServerConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), SessionError> {
    let listener = Listener::bind(addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    run(listener, config, shutdown).await
}

/// Drives a [`GameServer`] on one task: accepted sessions, their messages, and
/// the tick timer all feed the same loop, so handlers and ticks never overlap.
pub async fn run(
    mut listener: Listener,
    config: ServerConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), SessionError> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut ticker = time::interval(config.tick_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut server = GameServer::new(config);
    let mut sessions: BTreeMap<SessionId, SessionHandle> = BTreeMap::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept(&events_tx) => {
                if let Err(e) = accepted {
                    log::warn!("Failed to accept session: {e}");
                }
            }
            Some(event) = events_rx.recv() => match event {
                SessionEvent::Connected(handle) => {
                    server.connected(handle.id());
                    sessions.insert(handle.id(), handle);
                }
                SessionEvent::Message { session, envelope } => server.handle(session, &envelope),
                SessionEvent::Disconnected { session, .. } => {
                    sessions.remove(&session);
                    server.disconnected(session);
                }
            },
            _ = ticker.tick() => server.tick(),
            _ = &mut shutdown => {
                log::info!("Shutting down with {} sessions", sessions.len());
                return Ok(());
            }
        }

        deliver(server.drain_outbound(), &sessions);
    }
}

fn deliver(outbound: Vec<Outbound>, sessions: &BTreeMap<SessionId, SessionHandle>) {
    for Outbound { recipient, event } in outbound {
        let bytes: Arc<[u8]> = match event.to_envelope().encode() {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                log::error!("Failed to encode `{}`: {e}", event.name());
                continue;
            }
        };

        match recipient {
            Recipient::All => {
                for session in sessions.values() {
                    send(session, bytes.clone());
                }
            }
            Recipient::Session(id) => {
                if let Some(session) = sessions.get(&id) {
                    send(session, bytes);
                }
            }
        }
    }
}

fn send(session: &SessionHandle, bytes: Arc<[u8]>) {
    if let Err(e) = session.send_bytes(bytes) {
        log::debug!("Dropping message for session {}: {e}", session.id());
    }
}
