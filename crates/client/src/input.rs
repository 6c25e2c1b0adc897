use std::collections::HashSet;

use strider::{ClientCommand, InputAxis};

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Vec<ClientCommand>),
    Load,
    Status,
    Quit,
}

/// Turns prompt lines into protocol commands. Movement keys toggle, so the
/// held set mirrors what a keyboard would report.
#[derive(Debug, Default)]
pub struct Input {
    keys_held: HashSet<InputAxis>,
}

impl Input {
    pub fn is_held(&self, axis: InputAxis) -> bool {
        self.keys_held.contains(&axis)
    }

    pub fn parse_line(&mut self, line: &str) -> Result<Option<Action>, String> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };

        let action = match word {
            "load" => Action::Load,
            "ready" => Action::Send(vec![ClientCommand::Ready]),
            "start" => Action::Send(vec![ClientCommand::Start]),
            "fire" | "f" => Action::Send(vec![ClientCommand::Fire]),
            "explode" => Action::Send(vec![ClientCommand::Explode]),
            "status" => Action::Status,
            "quit" | "q" => Action::Quit,
            "mouse" | "m" => {
                let x = parse_delta(words.next())?;
                let y = parse_delta(words.next())?;
                Action::Send(vec![ClientCommand::Mouse { x, y }])
            }
            "center" | "c" => Action::Send(vec![
                ClientCommand::Input {
                    input: InputAxis::Center,
                    pressed: true,
                },
                ClientCommand::Input {
                    input: InputAxis::Center,
                    pressed: false,
                },
            ]),
            "stop" => Action::Send(self.release_all()),
            key => {
                let (explicit, name) = match key.split_at_checked(1) {
                    Some(("+", rest)) => (Some(true), rest),
                    Some(("-", rest)) => (Some(false), rest),
                    _ => (None, key),
                };
                let axis = axis_for(name).ok_or_else(|| format!("unknown input `{line}`"))?;
                let pressed = explicit.unwrap_or(!self.is_held(axis));
                Action::Send(self.set_key(axis, pressed).into_iter().collect())
            }
        };
        Ok(Some(action))
    }

    /// Returns the command to send, or `None` if the key was already in that state.
    fn set_key(&mut self, axis: InputAxis, pressed: bool) -> Option<ClientCommand> {
        let changed = if pressed {
            self.keys_held.insert(axis)
        } else {
            self.keys_held.remove(&axis)
        };
        changed.then_some(ClientCommand::Input {
            input: axis,
            pressed,
        })
    }

    fn release_all(&mut self) -> Vec<ClientCommand> {
        self.keys_held
            .drain()
            .map(|input| ClientCommand::Input {
                input,
                pressed: false,
            })
            .collect()
    }
}

fn axis_for(name: &str) -> Option<InputAxis> {
    match name {
        "w" => Some(InputAxis::Forward),
        "s" => Some(InputAxis::Backward),
        "a" => Some(InputAxis::Left),
        "d" => Some(InputAxis::Right),
        other => InputAxis::from_name(other).filter(|axis| *axis != InputAxis::Center),
    }
}

fn parse_delta(word: Option<&str>) -> Result<f32, String> {
    let word = word.ok_or("mouse needs x and y deltas")?;
    word.parse()
        .map_err(|_| format!("`{word}` is not a number"))
}
