use crate::context::FunctionId;
use crate::path::Path;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;
use thiserror::Error;

pub const CLIENT_TO_SERVER_CAP: usize = 65_536;
pub const SERVER_TO_CLIENT_CAP: usize = 1_048_576;

/// Messages sent to the server. Each serializes as a tagged JSON array.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["location", path]`
    Location(String),
    /// `["action", path, event, action]`
    Action {
        path: Path,
        event: String,
        action: Value,
    },
    /// `["hook", path, result]`
    Hook { path: Path, result: Value },
    /// `["ref", path, action]`
    Ref { path: Path, action: Value },
    /// `["event", path, fid, event]`
    Event {
        path: Path,
        fid: FunctionId,
        event: Value,
    },
}

impl ClientMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Action { .. } => "action",
            Self::Hook { .. } => "hook",
            Self::Ref { .. } => "ref",
            Self::Event { .. } => "event",
        }
    }

    pub fn to_json(&self) -> Value {
        // Serializing plain JSON values into a `Value` cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Location(path) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(path)?;
                seq.end()
            }
            Self::Action {
                path,
                event,
                action,
            } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(path)?;
                seq.serialize_element(event)?;
                seq.serialize_element(action)?;
                seq.end()
            }
            Self::Hook { path, result: body } | Self::Ref { path, action: body } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(path)?;
                seq.serialize_element(body)?;
                seq.end()
            }
            Self::Event { path, fid, event } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.tag())?;
                seq.serialize_element(path)?;
                seq.serialize_element(fid)?;
                seq.serialize_element(event)?;
                seq.end()
            }
        }
    }
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Location(String),
    Spine(Value),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown server message '{tag}'")]
    UnknownMessage { tag: String },
    #[error("malformed '{tag}' message: {reason}")]
    Malformed { tag: &'static str, reason: String },
}

impl ServerMessage {
    /// A JSON array is an envelope `[tag, …]`; any other value is a bare
    /// spine.
    pub fn decode(raw: Value) -> Result<Self, ProtocolError> {
        let Value::Array(items) = raw else {
            return Ok(Self::Spine(raw));
        };

        let mut items = items.into_iter();
        let tag = match items.next() {
            Some(Value::String(tag)) => tag,
            Some(other) => {
                return Err(ProtocolError::UnknownMessage {
                    tag: other.to_string(),
                });
            }
            None => {
                return Err(ProtocolError::Malformed {
                    tag: "envelope",
                    reason: "empty array".to_string(),
                });
            }
        };

        match tag.as_str() {
            "location" => match items.next() {
                Some(Value::String(path)) => Ok(Self::Location(path)),
                other => Err(ProtocolError::Malformed {
                    tag: "location",
                    reason: format!("expected string path, got {other:?}"),
                }),
            },
            "spine" => Ok(Self::Spine(items.next().unwrap_or(Value::Null))),
            _ => Err(ProtocolError::UnknownMessage { tag }),
        }
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(serde_json::from_slice(payload)?)
    }
}

/// Drains `rx` into `writer` as length-prefixed frames until every sender
/// is gone.
pub fn writer_loop(mut writer: impl Write, rx: Receiver<ClientMessage>) -> io::Result<()> {
    for message in rx {
        let payload = encode_client_message(&message)?;
        write_frame(&mut writer, &payload, CLIENT_TO_SERVER_CAP)?;
        writer.flush()?;
    }

    Ok(())
}

/// Reads frames from `reader` and hands each parsed payload to `on_payload`.
/// A clean end of stream returns `Ok`.
pub fn reader_loop<F>(mut reader: impl Read, mut on_payload: F) -> io::Result<()>
where
    F: FnMut(Value),
{
    loop {
        match read_frame(&mut reader, SERVER_TO_CLIENT_CAP) {
            Ok(payload) => {
                let value = serde_json::from_slice(&payload).map_err(json_error)?;
                on_payload(value);
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

fn encode_client_message(message: &ClientMessage) -> io::Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(json_error)
}

/// Reads one length-prefixed frame. The length is checked against
/// `max_payload` before the body is read.
pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut header = [0_u8; 4];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes(header) as usize;
    check_frame_len(len, max_payload)?;

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    check_frame_len(payload.len(), max_payload)?;
    let header = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length exceeds u32"))?
        .to_be_bytes();

    writer.write_all(&header)?;
    writer.write_all(payload)
}

fn check_frame_len(len: usize, max_payload: usize) -> io::Result<()> {
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds cap of {max_payload}"),
        ));
    }
    Ok(())
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
