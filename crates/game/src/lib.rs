pub mod client;
pub mod codec;
pub mod host;
pub mod map;
pub mod net;
pub mod physics;
pub mod player;
pub mod server;
pub mod simulation;
pub mod world;

pub use client::ClientState;
pub use codec::{CodecError, Decoder, Envelope, Fields, Value};
pub use map::{MapDefinition, MapError, MapObject, testing_ground};
pub use net::{
    ClientCommand, DEFAULT_PORT, DEFAULT_TICK_RATE, Listener, NetworkStats, PlayerId,
    ProtocolError, ServerEvent, SessionError, SessionEvent, SessionHandle, SessionId,
};
pub use physics::{CollisionMask, CollisionQuery, PhysicsWorld};
pub use player::{InputAxis, PlayerConfig, PlayerController, PlayerState};
pub use server::{GameServer, Outbound, Recipient, ServerConfig};
pub use simulation::SimulationLoop;
pub use world::{
    Incarnator, ObjectId, ObjectKind, ObjectRecord, ObjectState, StateMap, Transform, World,
    WorldConfig, WorldObject,
};
