use anyhow::Result;

use strider::net::{SessionEvent, SessionHandle};
use strider::{ClientCommand, ClientState, WorldConfig};

use crate::config::ClientConfig;
use crate::input::{Action, Input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Playing,
    Disconnected,
}

/// One connected client: the mirrored game state, the line input, and the
/// automatic load/ready/start sequence.
pub struct App {
    config: ClientConfig,
    session: SessionHandle,
    game: ClientState,
    input: Input,
    map: String,
    ready_sent: bool,
    start_sent: bool,
    state: AppState,
}

impl App {
    pub fn new(config: ClientConfig, session: SessionHandle, map: String) -> Self {
        Self {
            config,
            session,
            game: ClientState::new(WorldConfig::default()),
            input: Input::default(),
            map,
            ready_sent: false,
            start_sent: false,
            state: AppState::Playing,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn join(&mut self) -> Result<()> {
        self.send(ClientCommand::Join {
            name: self.config.name.clone(),
        })?;
        if self.config.auto_load {
            self.load()?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.send(ClientCommand::Load {
            map: self.map.clone(),
        })
    }

    fn send(&self, command: ClientCommand) -> Result<()> {
        log::debug!("Sending {}", command.name());
        self.session.send(&command.to_envelope())?;
        Ok(())
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Connected(handle) => {
                log::info!("Connected to {}", handle.peer_addr());
            }
            SessionEvent::Message { envelope, .. } => {
                if let Err(e) = self.game.handle(&envelope) {
                    log::error!("Bad message from server: {e}");
                    return Ok(());
                }
                self.after_server_event()?;
            }
            SessionEvent::Disconnected { error, .. } => {
                match error {
                    Some(e) => log::error!("Disconnected: {e}"),
                    None => log::info!("Server closed the connection"),
                }
                self.state = AppState::Disconnected;
            }
        }
        Ok(())
    }

    fn after_server_event(&mut self) -> Result<()> {
        if self.game.world().is_some() && self.config.auto_ready && !self.ready_sent {
            self.ready_sent = true;
            self.send(ClientCommand::Ready)?;
        }
        if self.game.local_player().is_some() && self.config.auto_start && !self.start_sent {
            self.start_sent = true;
            self.send(ClientCommand::Start)?;
        }
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        let action = match self.input.parse_line(line) {
            Ok(Some(action)) => action,
            Ok(None) => return Ok(()),
            Err(e) => {
                log::warn!("{e}");
                return Ok(());
            }
        };

        match action {
            Action::Send(commands) => {
                for command in commands {
                    self.send(command)?;
                }
            }
            Action::Load => self.load()?,
            Action::Status => self.log_status(),
            Action::Quit => self.state = AppState::Disconnected,
        }
        Ok(())
    }

    pub fn frame(&mut self, dt: f32) {
        self.game.advance(dt);
    }

    fn log_status(&self) {
        let stats = self.session.stats();
        log::info!(
            "frame {} | {} peers | sent {} msgs / {} bytes | received {} msgs / {} bytes",
            self.game.last_frame(),
            self.game.peers().len(),
            stats.messages_sent,
            stats.bytes_sent,
            stats.messages_received,
            stats.bytes_received,
        );

        let Some(world) = self.game.world() else {
            log::info!("No world loaded");
            return;
        };
        let Some(player) = self.game.local_player().and_then(|id| world.get(id)) else {
            log::info!("{} objects, not attached", world.object_count());
            return;
        };
        log::info!(
            "{} objects, at {} facing {:.1}",
            world.object_count(),
            player.transform.pos,
            player.transform.hpr.x,
        );
    }
}
