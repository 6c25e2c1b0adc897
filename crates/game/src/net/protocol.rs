use crate::codec::{Envelope, Fields, Value};
use crate::player::InputAxis;
use crate::world::{
    ObjectId, ObjectRecord, StateMap, records_from_value, records_to_value, states_from_value,
    states_to_value,
};

pub const DEFAULT_PORT: u16 = 19567;
pub const DEFAULT_TICK_RATE: u32 = 30;

/// Identity of a connected peer, handed out by the server on join.
pub type PlayerId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{0}`")]
    InvalidField(&'static str),
}

/// Looks up `name` and converts it with `extract`, distinguishing a missing
/// field from one of the wrong type.
pub fn read_field<'a, T>(
    fields: &'a Fields,
    name: &'static str,
    extract: impl FnOnce(&'a Value) -> Option<T>,
) -> Result<T, ProtocolError> {
    let value = fields.get(name).ok_or(ProtocolError::MissingField(name))?;
    extract(value).ok_or(ProtocolError::InvalidField(name))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Join { name: String },
    /// Map definition as JSON. Empty selects the built-in map.
    Load { map: String },
    Ready,
    Start,
    Input { input: InputAxis, pressed: bool },
    Mouse { x: f32, y: f32 },
    Fire,
    Explode,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Join { .. } => "join",
            ClientCommand::Load { .. } => "load",
            ClientCommand::Ready => "ready",
            ClientCommand::Start => "start",
            ClientCommand::Input { .. } => "input",
            ClientCommand::Mouse { .. } => "mouse",
            ClientCommand::Fire => "fire",
            ClientCommand::Explode => "explode",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let envelope = Envelope::new(self.name());
        match self {
            ClientCommand::Join { name } => envelope.with("name", name.as_str()),
            ClientCommand::Load { map } => envelope.with("map", map.as_str()),
            ClientCommand::Input { input, pressed } => envelope
                .with("input", input.name())
                .with("pressed", *pressed),
            ClientCommand::Mouse { x, y } => envelope.with("x", *x).with("y", *y),
            ClientCommand::Ready | ClientCommand::Start | ClientCommand::Fire | ClientCommand::Explode => {
                envelope
            }
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let fields = &envelope.fields;
        let command = match envelope.command.as_str() {
            "join" => ClientCommand::Join {
                name: read_field(fields, "name", Value::as_str)?.to_string(),
            },
            "load" => ClientCommand::Load {
                map: match fields.get("map") {
                    None | Some(Value::Nil) => String::new(),
                    Some(value) => value
                        .as_str()
                        .ok_or(ProtocolError::InvalidField("map"))?
                        .to_string(),
                },
            },
            "ready" => ClientCommand::Ready,
            "start" => ClientCommand::Start,
            "input" => ClientCommand::Input {
                input: read_field(fields, "input", |v| {
                    v.as_str().and_then(InputAxis::from_name)
                })?,
                pressed: read_field(fields, "pressed", Value::as_bool)?,
            },
            "mouse" => ClientCommand::Mouse {
                x: read_field(fields, "x", Value::as_f32)?,
                y: read_field(fields, "y", Value::as_f32)?,
            },
            "fire" => ClientCommand::Fire,
            "explode" => ClientCommand::Explode,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Reply to `join` carrying the sender's own identity.
    SelfId { id: PlayerId },
    Joined { name: String, id: PlayerId },
    Left { id: PlayerId },
    Loaded {
        objects: Vec<ObjectRecord>,
        state: Option<StateMap>,
    },
    Started,
    Attached {
        objects: Vec<ObjectRecord>,
        state: Option<StateMap>,
    },
    Removed { world_ids: Vec<ObjectId> },
    State { frame: u64, state: StateMap },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::SelfId { .. } => "self",
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::Left { .. } => "left",
            ServerEvent::Loaded { .. } => "loaded",
            ServerEvent::Started => "started",
            ServerEvent::Attached { .. } => "attached",
            ServerEvent::Removed { .. } => "removed",
            ServerEvent::State { .. } => "state",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let envelope = Envelope::new(self.name());
        match self {
            ServerEvent::SelfId { id } => envelope.with("id", *id),
            ServerEvent::Joined { name, id } => envelope.with("name", name.as_str()).with("id", *id),
            ServerEvent::Left { id } => envelope.with("id", *id),
            ServerEvent::Loaded { objects, state } | ServerEvent::Attached { objects, state } => {
                let envelope = envelope.with("objects", records_to_value(objects));
                match state {
                    Some(state) => envelope.with("state", states_to_value(state)),
                    None => envelope,
                }
            }
            ServerEvent::Started => envelope,
            ServerEvent::Removed { world_ids } => envelope.with(
                "world_ids",
                world_ids.iter().copied().map(Value::from).collect::<Vec<_>>(),
            ),
            ServerEvent::State { frame, state } => envelope
                .with("frame", *frame)
                .with("state", states_to_value(state)),
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let fields = &envelope.fields;
        let optional_state = || match fields.get("state") {
            None | Some(Value::Nil) => Ok(None),
            Some(value) => states_from_value(value).map(Some),
        };

        let event = match envelope.command.as_str() {
            "self" => ServerEvent::SelfId {
                id: read_field(fields, "id", Value::as_u32)?,
            },
            "joined" => ServerEvent::Joined {
                name: read_field(fields, "name", Value::as_str)?.to_string(),
                id: read_field(fields, "id", Value::as_u32)?,
            },
            "left" => ServerEvent::Left {
                id: read_field(fields, "id", Value::as_u32)?,
            },
            "loaded" => ServerEvent::Loaded {
                objects: records_from_value(read_field(fields, "objects", Some)?)?,
                state: optional_state()?,
            },
            "started" => ServerEvent::Started,
            "attached" => ServerEvent::Attached {
                objects: records_from_value(read_field(fields, "objects", Some)?)?,
                state: optional_state()?,
            },
            "removed" => ServerEvent::Removed {
                world_ids: read_field(fields, "world_ids", Value::as_seq)?
                    .iter()
                    .map(|id| id.as_u32().ok_or(ProtocolError::InvalidField("world_ids")))
                    .collect::<Result<_, _>>()?,
            },
            "state" => ServerEvent::State {
                frame: read_field(fields, "frame", Value::as_u64)?,
                state: states_from_value(read_field(fields, "state", Some)?)?,
            },
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{ObjectKind, ObjectState};
    use glam::Vec3;

    #[test]
    fn commands_survive_the_wire() {
        let commands = [
            ClientCommand::Join {
                name: "A".to_string(),
            },
            ClientCommand::Load { map: String::new() },
            ClientCommand::Input {
                input: InputAxis::Left,
                pressed: true,
            },
            ClientCommand::Mouse { x: 0.25, y: -0.5 },
            ClientCommand::Fire,
        ];

        for command in commands {
            let bytes = command.to_envelope().encode().unwrap();
            let mut decoder = crate::codec::Decoder::new();
            decoder.feed(&bytes);
            let envelope = decoder.decode_next().unwrap().unwrap();
            assert_eq!(ClientCommand::from_envelope(&envelope).unwrap(), command);
        }
    }

    #[test]
    fn unknown_command_is_reported() {
        let envelope = Envelope::new("teleport");
        assert_eq!(
            ClientCommand::from_envelope(&envelope),
            Err(ProtocolError::UnknownCommand("teleport".to_string()))
        );
    }

    #[test]
    fn missing_and_invalid_fields_are_distinct() {
        let missing = Envelope::new("join");
        assert_eq!(
            ClientCommand::from_envelope(&missing),
            Err(ProtocolError::MissingField("name"))
        );

        let invalid = Envelope::new("input")
            .with("input", "sideways")
            .with("pressed", true);
        assert_eq!(
            ClientCommand::from_envelope(&invalid),
            Err(ProtocolError::InvalidField("input"))
        );
    }

    #[test]
    fn load_without_map_selects_builtin() {
        assert_eq!(
            ClientCommand::from_envelope(&Envelope::new("load")),
            Ok(ClientCommand::Load { map: String::new() })
        );
    }

    #[test]
    fn events_survive_the_wire() {
        let mut state = StateMap::new();
        state.insert(
            3,
            ObjectState {
                pos: Vec3::new(1.0, 2.0, 3.0),
                hpr: Vec3::new(90.0, 0.0, 0.0),
                head_hpr: Some(Vec3::new(-30.0, 5.0, 0.0)),
            },
        );

        let events = [
            ServerEvent::Joined {
                name: "A".to_string(),
                id: 1,
            },
            ServerEvent::Attached {
                objects: vec![ObjectRecord {
                    world_id: Some(3),
                    name: "A".to_string(),
                    kind: ObjectKind::Player { pid: 1 },
                }],
                state: Some(state.clone()),
            },
            ServerEvent::Removed {
                world_ids: vec![3, 4],
            },
            ServerEvent::State { frame: 12, state },
        ];

        for event in events {
            let envelope = event.to_envelope();
            assert_eq!(envelope.command, event.name());
            assert_eq!(ServerEvent::from_envelope(&envelope).unwrap(), event);
        }
    }
}
