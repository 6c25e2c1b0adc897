mod config;

pub use config::ServerConfig;

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::codec::Envelope;
use crate::map::{MapDefinition, testing_ground};
use crate::net::{ClientCommand, PlayerId, ProtocolError, ServerEvent};
use crate::player::InputAxis;
use crate::simulation::SimulationLoop;
use crate::world::{ObjectId, StateMap, World, WorldObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Session(PlayerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub event: ServerEvent,
}

#[derive(Debug, Default)]
struct Peer {
    name: Option<String>,
}

/// Server-side protocol handlers. Transport-agnostic: sessions are identified
/// by id and everything to send is queued as [`Outbound`] for the host to
/// deliver.
pub struct GameServer {
    config: ServerConfig,
    peers: BTreeMap<PlayerId, Peer>,
    world: Option<World>,
    simulation: SimulationLoop,
    rng: StdRng,
    outbound: Vec<Outbound>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            simulation: SimulationLoop::new(config.tick_rate),
            config,
            peers: BTreeMap::new(),
            world: None,
            rng,
            outbound: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn simulation(&self) -> &SimulationLoop {
        &self.simulation
    }

    pub fn is_running(&self) -> bool {
        self.simulation.is_running()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    fn send(&mut self, id: PlayerId, event: ServerEvent) {
        self.outbound.push(Outbound {
            recipient: Recipient::Session(id),
            event,
        });
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.outbound.push(Outbound {
            recipient: Recipient::All,
            event,
        });
    }

    pub fn connected(&mut self, id: PlayerId) {
        log::debug!("Peer {id} connected");
        self.peers.insert(id, Peer::default());
    }

    /// Drops the peer and its player object before the next tick can see it.
    pub fn disconnected(&mut self, id: PlayerId) {
        let Some(peer) = self.peers.remove(&id) else {
            return;
        };

        if let Some(world) = self.world.as_mut() {
            if let Some(world_id) = world.find_player(id) {
                world.remove(world_id);
                self.broadcast(ServerEvent::Removed {
                    world_ids: vec![world_id],
                });
            }
        }

        if let Some(name) = peer.name {
            log::info!("{name} ({id}) left");
            self.broadcast(ServerEvent::Left { id });
        }
    }

    /// Decodes and dispatches one message. Unknown or malformed commands are
    /// logged and dropped; the session stays up.
    pub fn handle(&mut self, id: PlayerId, envelope: &Envelope) {
        match ClientCommand::from_envelope(envelope) {
            Ok(command) => self.handle_command(id, command),
            Err(ProtocolError::UnknownCommand(name)) => {
                log::error!("Peer {id} sent unknown command `{name}`");
            }
            Err(e) => log::warn!("Peer {id} sent a bad `{}`: {e}", envelope.command),
        }
    }

    pub fn handle_command(&mut self, id: PlayerId, command: ClientCommand) {
        if !self.peers.contains_key(&id) {
            log::warn!("Dropping {} from unknown peer {id}", command.name());
            return;
        }

        match command {
            ClientCommand::Join { name } => self.handle_join(id, name),
            ClientCommand::Load { map } => self.handle_load(&map),
            ClientCommand::Ready => self.handle_ready(id),
            ClientCommand::Start => self.handle_start(),
            ClientCommand::Input { input, pressed } => self.handle_input(id, input, pressed),
            ClientCommand::Mouse { x, y } => self.handle_mouse(id, x, y),
            ClientCommand::Fire => self.handle_fire(id),
            ClientCommand::Explode => self.handle_explode(),
        }
    }

    fn handle_join(&mut self, id: PlayerId, name: String) {
        log::info!("{name} ({id}) joined");
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.name = Some(name.clone());
        }

        self.send(id, ServerEvent::SelfId { id });
        self.broadcast(ServerEvent::Joined { name, id });

        let Some(world) = self.world.as_ref() else {
            return;
        };
        let loaded = ServerEvent::Loaded {
            objects: world.serialize(),
            state: Some(world.get_state()),
        };
        self.send(id, loaded);
        if self.simulation.is_running() {
            self.send(id, ServerEvent::Started);
        }
    }

    fn handle_load(&mut self, map: &str) {
        if self.world.is_some() {
            log::debug!("Ignoring load, a world is already loaded");
            return;
        }

        let definition = if map.trim().is_empty() {
            testing_ground()
        } else {
            match MapDefinition::from_json(map) {
                Ok(definition) => definition,
                Err(e) => {
                    log::warn!("Ignoring load with bad map: {e}");
                    return;
                }
            }
        };

        let mut world = World::new(self.config.world.clone());
        definition.spawn(&mut world);

        let loaded = ServerEvent::Loaded {
            objects: world.serialize(),
            state: Some(world.get_state()),
        };
        self.world = Some(world);
        self.broadcast(loaded);
    }

    fn handle_ready(&mut self, id: PlayerId) {
        let Some(world) = self.world.as_mut() else {
            log::debug!("Ignoring ready from {id}, no world loaded");
            return;
        };
        if world.find_player(id).is_some() {
            return;
        }

        let name = self
            .peers
            .get(&id)
            .and_then(|peer| peer.name.clone())
            .unwrap_or_else(|| format!("player {id}"));
        let spawn = world.random_incarnator(&mut self.rng);
        let world_id = world.attach(WorldObject::player(id, name, spawn));

        let attached = attached_event(world, world_id);
        self.broadcast(attached);
    }

    fn handle_start(&mut self) {
        if self.world.is_none() {
            log::debug!("Ignoring start, no world loaded");
            return;
        }
        if self.simulation.start() {
            log::info!("Simulation started");
            self.broadcast(ServerEvent::Started);
        }
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut WorldObject> {
        let world = self.world.as_mut()?;
        let world_id = world.find_player(id)?;
        world.get_mut(world_id)
    }

    fn handle_input(&mut self, id: PlayerId, input: InputAxis, pressed: bool) {
        let Some(player) = self.player_mut(id).and_then(|object| object.player.as_mut()) else {
            return;
        };
        player.set_input(input, pressed);
    }

    fn handle_mouse(&mut self, id: PlayerId, x: f32, y: f32) {
        let Some(player) = self.player_mut(id).and_then(|object| object.player.as_mut()) else {
            return;
        };
        player.add_look(x, y);
    }

    fn handle_fire(&mut self, id: PlayerId) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let Some(player_id) = world.find_player(id) else {
            return;
        };
        let Some(grenade) = world.fire(player_id) else {
            return;
        };

        let attached = attached_event(world, grenade);
        self.broadcast(attached);
    }

    fn handle_explode(&mut self) {
        if let Some(world) = self.world.as_mut() {
            world.explode(&mut self.rng);
        }
    }

    /// Runs one simulation tick, if started, and queues its events for everyone.
    pub fn tick(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        for event in self.simulation.step(world) {
            self.broadcast(event);
        }
    }
}

fn attached_event(world: &World, world_id: ObjectId) -> ServerEvent {
    let Some(object) = world.get(world_id) else {
        return ServerEvent::Attached {
            objects: Vec::new(),
            state: None,
        };
    };

    let mut state = StateMap::new();
    state.insert(world_id, object.state(world.player_config()));
    ServerEvent::Attached {
        objects: vec![object.record()],
        state: Some(state),
    }
}
