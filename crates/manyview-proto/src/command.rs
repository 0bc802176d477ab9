use crate::wire::Envelope;
use serde_json::{json, Map, Value};

/// Outbound messages the client may send to the backend.
///
/// Each variant serializes into one [`Envelope`]. Optional fields that the
/// backend treats as "omitted means default" are left out of the content
/// object entirely rather than sent as null.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Handshake; always the first message on a fresh connection.
    ClientInit { name: String },
    TaskStart {
        name: String,
        program: String,
        /// None lets the backend pick a core.
        core: Option<u32>,
    },
    TaskMove {
        id: String,
        /// None omits the destination entirely; `-1` tells the backend to
        /// unassign the task explicitly.
        to_core: Option<i64>,
    },
    TaskPause { id: String },
    TaskResume {
        id: String,
        core: Option<u32>,
    },
    TaskStop { id: String },
    TaskDuplicate { id: String },
    TaskOutputRequest {
        id: String,
        /// Lines already held locally; 0 asks for the full log.
        offset: usize,
    },
    CoreSetFrequency {
        frequency: u32,
        /// None applies to the whole chip.
        core: Option<u32>,
    },
    SelectionNew { sample_vars: Vec<String> },
    SelectionSend,
    ResumeSim,
    PauseSim,
    SetStep { step: u64 },
    ChangeDelay { delay: f64 },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientInit { .. } => "client_init",
            Self::TaskStart { .. } => "task_start",
            Self::TaskMove { .. } => "task_move",
            Self::TaskPause { .. } => "task_pause",
            Self::TaskResume { .. } => "task_resume",
            Self::TaskStop { .. } => "task_stop",
            Self::TaskDuplicate { .. } => "task_duplicate",
            Self::TaskOutputRequest { .. } => "task_output_request",
            Self::CoreSetFrequency { .. } => "core_set_frequency",
            Self::SelectionNew { .. } => "selection_new",
            Self::SelectionSend => "selection_send",
            Self::ResumeSim => "resume_sim",
            Self::PauseSim => "pause_sim",
            Self::SetStep { .. } => "set_step",
            Self::ChangeDelay { .. } => "change_delay",
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let content = match self {
            Self::ClientInit { name } => json!({ "name": name }),
            Self::TaskStart {
                name,
                program,
                core,
            } => {
                let mut content = Map::new();
                content.insert("name".into(), Value::from(name));
                content.insert("program".into(), Value::from(program));
                if let Some(core) = core {
                    content.insert("core".into(), Value::from(core));
                }
                Value::Object(content)
            }
            Self::TaskMove { id, to_core } => {
                let mut content = Map::new();
                content.insert("id".into(), Value::from(id));
                if let Some(to_core) = to_core {
                    content.insert("to_core".into(), Value::from(to_core));
                }
                Value::Object(content)
            }
            Self::TaskPause { id } => json!({ "id": id }),
            Self::TaskResume { id, core } => {
                let mut content = Map::new();
                content.insert("id".into(), Value::from(id));
                if let Some(core) = core {
                    content.insert("core".into(), Value::from(core));
                }
                Value::Object(content)
            }
            Self::TaskStop { id } => json!({ "id": id }),
            Self::TaskDuplicate { id } => json!({ "id": id }),
            Self::TaskOutputRequest { id, offset } => {
                let mut content = Map::new();
                content.insert("id".into(), Value::from(id));
                if offset > 0 {
                    content.insert("offset".into(), Value::from(offset));
                }
                Value::Object(content)
            }
            Self::CoreSetFrequency { frequency, core } => {
                let mut content = Map::new();
                content.insert("frequency".into(), Value::from(frequency));
                if let Some(core) = core {
                    content.insert("id".into(), Value::from(core));
                }
                Value::Object(content)
            }
            Self::SelectionNew { sample_vars } => json!({ "sample_vars": sample_vars }),
            Self::SelectionSend | Self::ResumeSim | Self::PauseSim => json!({}),
            Self::SetStep { step } => json!({ "step": step }),
            Self::ChangeDelay { delay } => json!({ "delay": delay }),
        };
        Envelope::new(kind, content)
    }
}
