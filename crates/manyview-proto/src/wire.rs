use crate::frame::FrameError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Message types the backend is allowed to send.
pub const KNOWN_MESSAGE_TYPES: [&str; 6] = [
    "server_init",
    "status",
    "task_output",
    "sim_data",
    "selection_set",
    "invalid_message",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame was not a well-formed `{type, content}` JSON object.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// The frame decoded but is semantically wrong (unknown type, or a
    /// sequencing violation such as data before `server_init`).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// One decoded protocol message: `{"type": <string>, "content": <object>}`.
/// Transient; routers consume it and never retain it past dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content,
        }
    }
}

/// Serializes one envelope as single-line JSON with a trailing `\n`.
///
/// serde_json escapes embedded newlines inside string values, so the payload
/// itself never contains a literal delimiter.
pub fn encode_frame(envelope: &Envelope, max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    let mut encoded =
        serde_json::to_vec(envelope).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    encoded.push(b'\n');
    Ok(encoded)
}

/// Parses one frame (newline already stripped) into an [`Envelope`].
///
/// Never panics and never raises past the caller: a frame that is not JSON,
/// not an object, or missing the `type`/`content` shape comes back as
/// [`ProtocolError::MalformedMessage`] for the caller's log-and-discard path.
pub fn decode_frame(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let envelope: Envelope = serde_json::from_slice(frame)
        .map_err(|err| ProtocolError::MalformedMessage(err.to_string()))?;
    if !envelope.content.is_object() {
        return Err(ProtocolError::MalformedMessage(format!(
            "content of '{}' is not an object",
            envelope.kind
        )));
    }
    Ok(envelope)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInitPayload {
    pub name: String,
    pub cores: usize,
    #[serde(default)]
    pub sample_vars: Vec<String>,
    #[serde(default)]
    pub default_vars: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub chip: ChipStatus,
}

/// Full-state chip snapshot. Field casing follows the backend's wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChipStatus {
    #[serde(rename = "Cores")]
    pub cores: Vec<CoreStatus>,
    #[serde(rename = "Tasks", default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(rename = "Power", default)]
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreStatus {
    /// Percent, 0-100 on the wire; the model normalizes to [0, 1].
    #[serde(rename = "CPU")]
    pub cpu: f64,
    #[serde(rename = "MEM")]
    pub mem: f64,
    #[serde(rename = "Frequency")]
    pub frequency: f64,
    #[serde(rename = "Voltage")]
    pub voltage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    /// Assigned core index; negative means unassigned.
    #[serde(rename = "Core")]
    pub core: i64,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "CPU", default)]
    pub cpu: f64,
    #[serde(rename = "MEM", default)]
    pub mem: f64,
}

impl TaskEntry {
    pub fn core_index(&self) -> Option<usize> {
        usize::try_from(self.core).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutputPayload {
    pub id: String,
    #[serde(default)]
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimDataPayload {
    /// Variable path (`component[:subpath]*`) to sampled value. The kernel
    /// cycle counter travels inside this map under [`SimDataPayload::KERNEL_CYCLE`].
    #[serde(default)]
    pub data: HashMap<String, f64>,
    pub status: SimStatusPayload,
}

impl SimDataPayload {
    pub const KERNEL_CYCLE: &'static str = "kernel.cycle";

    pub fn kernel_cycle(&self) -> Option<f64> {
        self.data.get(Self::KERNEL_CYCLE).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimStatusPayload {
    pub delay: f64,
    /// 0 = paused, anything else = running.
    pub sim: i64,
    pub step: i64,
}

impl SimStatusPayload {
    pub fn is_running(&self) -> bool {
        self.sim != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionSetPayload {
    #[serde(default)]
    pub sample_vars: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidMessageNote {
    #[serde(default)]
    pub message: String,
}

/// Closed set of inbound messages. Unknown type tags fail here with
/// [`ProtocolError::InvalidMessage`]; a recognized tag whose content does not
/// match its payload shape fails with [`ProtocolError::MalformedMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ServerInit(ServerInitPayload),
    Status(StatusPayload),
    TaskOutput(TaskOutputPayload),
    SimData(SimDataPayload),
    SelectionSet(SelectionSetPayload),
    InvalidMessage(InvalidMessageNote),
}

impl ServerMessage {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.kind.as_str() {
            "server_init" => parse_content(envelope).map(Self::ServerInit),
            "status" => parse_content(envelope).map(Self::Status),
            "task_output" => parse_content(envelope).map(Self::TaskOutput),
            "sim_data" => parse_content(envelope).map(Self::SimData),
            "selection_set" => parse_content(envelope).map(Self::SelectionSet),
            "invalid_message" => parse_content(envelope).map(Self::InvalidMessage),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown message type: {other}"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServerInit(_) => "server_init",
            Self::Status(_) => "status",
            Self::TaskOutput(_) => "task_output",
            Self::SimData(_) => "sim_data",
            Self::SelectionSet(_) => "selection_set",
            Self::InvalidMessage(_) => "invalid_message",
        }
    }
}

fn parse_content<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, ProtocolError> {
    serde_json::from_value(envelope.content.clone()).map_err(|err| {
        ProtocolError::MalformedMessage(format!("bad '{}' content: {err}", envelope.kind))
    })
}
