use std::collections::BTreeMap;

use crate::codec::Envelope;
use crate::net::{PlayerId, ProtocolError, ServerEvent};
use crate::world::{ObjectId, World, WorldConfig, WorldObject};

/// Client-side mirror of the server's world, driven by server events.
pub struct ClientState {
    config: WorldConfig,
    pid: Option<PlayerId>,
    peers: BTreeMap<PlayerId, String>,
    world: Option<World>,
    local_player: Option<ObjectId>,
    started: bool,
    last_frame: u64,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl ClientState {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            pid: None,
            peers: BTreeMap::new(),
            world: None,
            local_player: None,
            started: false,
            last_frame: 0,
        }
    }

    pub fn pid(&self) -> Option<PlayerId> {
        self.pid
    }

    pub fn peers(&self) -> &BTreeMap<PlayerId, String> {
        &self.peers
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn local_player(&self) -> Option<ObjectId> {
        self.local_player
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Frame number of the most recent `state` update.
    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    pub fn handle(&mut self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let event = ServerEvent::from_envelope(envelope)?;
        self.handle_event(event);
        Ok(())
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SelfId { id } => {
                log::info!("Joined as player {id}");
                self.pid = Some(id);
            }
            ServerEvent::Joined { name, id } => {
                log::info!("{name} joined");
                self.peers.insert(id, name);
            }
            ServerEvent::Left { id } => {
                if let Some(name) = self.peers.remove(&id) {
                    log::info!("{name} left");
                }
            }
            ServerEvent::Loaded { objects, state } => {
                let mut world = World::new(self.config.clone());
                world.deserialize(&objects);
                if let Some(state) = state {
                    world.set_state(&state, false);
                }
                log::info!("World loaded with {} objects", world.object_count());
                self.world = Some(world);
                self.resolve_local_player();
            }
            ServerEvent::Started => {
                self.started = true;
                self.resolve_local_player();
            }
            ServerEvent::Attached { objects, state } => {
                let Some(world) = self.world.as_mut() else {
                    log::warn!("Attached before any world was loaded");
                    return;
                };
                for record in &objects {
                    world.attach(WorldObject::from_record(record));
                }
                if let Some(state) = state {
                    world.set_state(&state, false);
                }
                self.resolve_local_player();
            }
            ServerEvent::Removed { world_ids } => {
                let Some(world) = self.world.as_mut() else {
                    return;
                };
                for id in world_ids {
                    world.remove(id);
                    if self.local_player == Some(id) {
                        self.local_player = None;
                    }
                }
            }
            ServerEvent::State { frame, state } => {
                let Some(world) = self.world.as_mut() else {
                    return;
                };
                world.set_state(&state, true);
                self.last_frame = frame;
            }
        }
    }

    /// Advances fluid updates by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        if let Some(world) = self.world.as_mut() {
            world.animate(dt);
        }
    }

    fn resolve_local_player(&mut self) {
        let (Some(pid), Some(world)) = (self.pid, self.world.as_ref()) else {
            return;
        };
        self.local_player = world.find_player(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Incarnator, ObjectState, StateMap};
    use glam::Vec3;

    fn loaded_client() -> (ClientState, ObjectId) {
        let mut server_world = World::default();
        server_world.attach(WorldObject::ground());
        let player = server_world.attach(WorldObject::player(
            2,
            "B",
            Incarnator::new(Vec3::new(1.0, 2.0, 0.0), 90.0),
        ));

        let mut client = ClientState::default();
        client.handle_event(ServerEvent::SelfId { id: 2 });
        client.handle_event(ServerEvent::Loaded {
            objects: server_world.serialize(),
            state: Some(server_world.get_state()),
        });
        (client, player)
    }

    #[test]
    fn loaded_resolves_local_player() {
        let (client, player) = loaded_client();
        assert_eq!(client.local_player(), Some(player));
        let world = client.world().unwrap();
        assert_eq!(world.get(player).unwrap().transform.hpr.x, 90.0);
    }

    #[test]
    fn state_is_applied_fluidly() {
        let (mut client, player) = loaded_client();
        let mut state = StateMap::new();
        state.insert(
            player,
            ObjectState {
                pos: Vec3::new(3.0, 2.0, 0.0),
                hpr: Vec3::new(90.0, 0.0, 0.0),
                head_hpr: Some(Vec3::ZERO),
            },
        );

        client.handle_event(ServerEvent::State { frame: 4, state });
        assert_eq!(client.last_frame(), 4);
        let pos = |client: &ClientState| client.world().unwrap().get(player).unwrap().transform.pos;
        assert_eq!(pos(&client), Vec3::new(1.0, 2.0, 0.0));

        client.advance(1.0);
        assert_eq!(pos(&client), Vec3::new(3.0, 2.0, 0.0));
    }

    #[test]
    fn removed_forgets_local_player() {
        let (mut client, player) = loaded_client();
        client.handle_event(ServerEvent::Removed {
            world_ids: vec![player],
        });
        assert_eq!(client.local_player(), None);
        assert!(client.world().unwrap().get(player).is_none());
    }

    #[test]
    fn peers_are_tracked() {
        let mut client = ClientState::default();
        client.handle_event(ServerEvent::Joined {
            name: "A".to_string(),
            id: 1,
        });
        assert_eq!(client.peers().get(&1).map(String::as_str), Some("A"));
        client.handle_event(ServerEvent::Left { id: 1 });
        assert!(client.peers().is_empty());
    }

    #[test]
    fn envelopes_are_decoded_and_applied() {
        let mut client = ClientState::default();
        client
            .handle(&ServerEvent::SelfId { id: 5 }.to_envelope())
            .unwrap();
        assert_eq!(client.pid(), Some(5));

        assert_eq!(
            client.handle(&Envelope::new("dance")),
            Err(ProtocolError::UnknownCommand("dance".to_string()))
        );
    }
}
