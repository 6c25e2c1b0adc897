mod protocol;
mod session;
mod stats;

pub use protocol::{
    ClientCommand, DEFAULT_PORT, DEFAULT_TICK_RATE, PlayerId, ProtocolError, ServerEvent,
    read_field,
};
pub use session::{
    Listener, SessionError, SessionEvent, SessionHandle, SessionId, connect, spawn_session,
};
pub use stats::{NetworkStats, SessionStats};
