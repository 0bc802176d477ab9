//! Wire protocol for the manyview front-end: newline-delimited JSON frames
//! carrying `{"type": ..., "content": ...}` envelopes between the
//! visualization client and the many-core backend.

pub mod command;
pub mod frame;
pub mod wire;

pub use command::Command;
pub use frame::{FrameBatch, FrameError, LineFramer, DEFAULT_MAX_FRAME_BYTES};
pub use wire::{
    decode_frame, encode_frame, ChipStatus, CoreStatus, Envelope, InvalidMessageNote,
    ProtocolError, SelectionSetPayload, ServerInitPayload, ServerMessage, SimDataPayload,
    SimStatusPayload, StatusPayload, TaskEntry, TaskOutputPayload,
};
