use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::codec::{CodecError, Decoder, Envelope};

use super::stats::{NetworkStats, SessionStats};

pub type SessionId = u32;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection refused by {0}")]
    ConnectionRefused(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("session closed")]
    Closed,
}

#[derive(Debug)]
pub enum SessionEvent {
    Connected(SessionHandle),
    Message {
        session: SessionId,
        envelope: Envelope,
    },
    /// The stream ended. `error` is `None` for an orderly close by the peer.
    Disconnected {
        session: SessionId,
        error: Option<SessionError>,
    },
}

/// Sending side of a live session. Cheap to clone; the connection stays open
/// until the peer goes away or every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Arc<[u8]>>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let bytes = envelope.encode()?;
        self.send_bytes(bytes.into())
    }

    /// Queues already-encoded bytes, so a broadcast is encoded once and shared.
    pub fn send_bytes(&self, bytes: Arc<[u8]>) -> Result<(), SessionError> {
        self.outbound.send(bytes).map_err(|_| SessionError::Closed)
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.snapshot()
    }
}

/// Dials `addr`. A refused dial is reported as [`SessionError::ConnectionRefused`]
/// rather than a generic I/O failure.
pub async fn connect(
    addr: &str,
    id: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<SessionHandle, SessionError> {
    let stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
        io::ErrorKind::ConnectionRefused => SessionError::ConnectionRefused(addr.to_string()),
        _ => SessionError::Io(e),
    })?;
    spawn_session(stream, id, events)
}

/// Takes ownership of a connected stream and starts its reader and writer
/// tasks. `Connected` is delivered before any `Message` from this session.
pub fn spawn_session(
    stream: TcpStream,
    id: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Result<SessionHandle, SessionError> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let (reader, writer) = stream.into_split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let stats = Arc::new(SessionStats::default());
    let handle = SessionHandle {
        id,
        peer,
        outbound: outbound_tx,
        stats: stats.clone(),
    };

    events
        .send(SessionEvent::Connected(handle.clone()))
        .map_err(|_| SessionError::Closed)?;

    tokio::spawn(write_loop(id, writer, outbound_rx, stats.clone()));
    tokio::spawn(read_loop(id, reader, events, stats));

    Ok(handle)
}

async fn read_loop(
    id: SessionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<SessionEvent>,
    stats: Arc<SessionStats>,
) {
    let mut decoder = Decoder::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    let error = loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) => break Some(SessionError::Io(e)),
        };
        stats.record_bytes_received(read);
        decoder.feed(&chunk[..read]);

        let failure = loop {
            match decoder.decode_next() {
                Ok(Some(envelope)) => {
                    stats.record_message_received();
                    if events
                        .send(SessionEvent::Message {
                            session: id,
                            envelope,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        if let Some(e) = failure {
            log::warn!("Session {id} sent malformed data, closing: {e}");
            break Some(SessionError::Codec(e));
        }
    };

    match &error {
        None => log::info!("Session {id} closed by peer"),
        Some(e) => log::info!("Session {id} disconnected: {e}"),
    }
    let _ = events.send(SessionEvent::Disconnected { session: id, error });
}

async fn write_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Arc<[u8]>>,
    stats: Arc<SessionStats>,
) {
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            log::debug!("Session {id} write failed: {e}");
            break;
        }
        stats.record_sent(bytes.len());
    }
    let _ = writer.shutdown().await;
}

/// Accepts incoming sessions, numbering them from 1.
pub struct Listener {
    inner: TcpListener,
    next_id: SessionId,
}

impl Listener {
    pub async fn bind(addr: &str) -> Result<Self, SessionError> {
        Ok(Self::from_tcp(TcpListener::bind(addr).await?))
    }

    pub fn from_tcp(listener: TcpListener) -> Self {
        Self {
            inner: listener,
            next_id: 1,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SessionError> {
        Ok(self.inner.local_addr()?)
    }

    pub async fn accept(
        &mut self,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<SessionHandle, SessionError> {
        let (stream, addr) = self.inner.accept().await?;
        let id = self.next_id;
        self.next_id += 1;
        log::info!("Accepted session {id} from {addr}");
        spawn_session(stream, id, events.clone())
    }
}
