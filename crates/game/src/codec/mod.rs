mod value;

pub use value::{Fields, Value};

use std::io;

use bincode::Options;
use serde::{Deserialize, Serialize};

/// Upper bound on a single encoded message. Anything larger is treated as corruption.
pub const MAX_MESSAGE_SIZE: u64 = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encoding failed: {0}")]
    Encode(bincode::Error),
    #[error("malformed message: {0}")]
    Malformed(bincode::Error),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_SIZE)
}

/// One `(command, fields)` message as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    pub fields: Fields,
}

impl Envelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fields: Fields::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        options().serialize(self).map_err(CodecError::Encode)
    }
}

pub fn encode(command: &str, fields: Fields) -> Result<Vec<u8>, CodecError> {
    Envelope {
        command: command.to_string(),
        fields,
    }
    .encode()
}

/// Incremental decoder. Bytes may be fed in arbitrary chunks; complete messages
/// are handed out as soon as they are buffered and any trailing partial message
/// is kept for the next feed.
#[derive(Debug, Default)]
pub struct Decoder {
    buffer: Vec<u8>,
    cursor: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Decodes the next complete message, or `None` if only a partial one is buffered.
    pub fn decode_next(&mut self) -> Result<Option<Envelope>, CodecError> {
        let pending = &self.buffer[self.cursor..];
        if pending.is_empty() {
            return Ok(None);
        }

        let mut reader = io::Cursor::new(pending);
        match options().deserialize_from::<_, Envelope>(&mut reader) {
            Ok(envelope) => {
                self.cursor += reader.position() as usize;
                Ok(Some(envelope))
            }
            Err(err) if is_incomplete(&err) => Ok(None),
            Err(err) => {
                self.buffer.clear();
                self.cursor = 0;
                Err(CodecError::Malformed(err))
            }
        }
    }

    pub fn messages(&mut self) -> Messages<'_> {
        Messages {
            decoder: self,
            failed: false,
        }
    }
}

/// Lazy iterator over the complete messages currently buffered in a [`Decoder`].
/// Stops after the first decoding error.
pub struct Messages<'a> {
    decoder: &'a mut Decoder,
    failed: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Envelope, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.decoder.decode_next().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}

fn is_incomplete(err: &bincode::Error) -> bool {
    matches!(&**err, bincode::ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
}
