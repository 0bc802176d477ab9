use crate::model::TaskStatus;

/// State-change notifications pushed to the view layer. Each reconciliation
/// pass emits zero or more of these; the view treats them as invalidation
/// hints and reads the shared [`crate::model::ChipState`] for detail.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Handshake completed; core layout is known.
    Initialized { name: String, cores: usize },
    /// A status snapshot was applied.
    StatusApplied { chip_load: f64, chip_power: f64 },
    TaskAdded { id: String },
    TaskMoved { id: String, core: Option<usize> },
    TaskFinished { id: String, status: TaskStatus },
    TaskRemoved { id: String },
    /// New output lines were appended to a task.
    TaskOutput { id: String, appended: usize },
    /// A telemetry sample batch was applied.
    SimData {
        kernel_cycle: f64,
        running: bool,
        delay: f64,
        step: i64,
    },
    /// The backend confirmed a new sampling selection.
    SelectionApplied { vars: Vec<String> },
    /// The backend rejected something we sent.
    ServerFault { message: String },
    /// The connection closed; no further events will follow.
    Disconnected,
}
