use crate::model::ChipState;
use manyview_proto::Command;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle the view layer uses to send commands to the backend. Clones share
/// one bounded queue drained by the transport; a full queue drops the command
/// with a warning instead of blocking the UI.
#[derive(Debug, Clone)]
pub struct CommandIssuer {
    tx: mpsc::Sender<Command>,
    voltage_islands: std::sync::Arc<Vec<Vec<u32>>>,
}

impl CommandIssuer {
    pub fn new(tx: mpsc::Sender<Command>, voltage_islands: Vec<Vec<u32>>) -> Self {
        Self {
            tx,
            voltage_islands: std::sync::Arc::new(voltage_islands),
        }
    }

    fn send(&self, command: Command) {
        if let Err(err) = self.tx.try_send(command) {
            warn!(event = "command_dropped", error = %err);
        }
    }

    pub fn start_task(&self, name: &str, program: &str, core: Option<u32>) {
        self.send(Command::TaskStart {
            name: name.to_string(),
            program: program.to_string(),
            core,
        });
    }

    /// Starts a locally created task: its placeholder leaves the pending
    /// table and the backend takes over under whatever id it assigns.
    pub fn start_pending_task(&self, state: &mut ChipState, id: &str, core: Option<u32>) -> bool {
        let Some(pending) = state.resolve_pending_task(id) else {
            warn!(event = "unknown_pending_task", id = %id);
            return false;
        };
        self.start_task(&pending.name, &pending.program, core);
        true
    }

    pub fn move_task(&self, id: &str, to_core: Option<i64>) {
        self.send(Command::TaskMove {
            id: id.to_string(),
            to_core,
        });
    }

    pub fn pause_task(&self, id: &str) {
        self.send(Command::TaskPause { id: id.to_string() });
    }

    pub fn resume_task(&self, id: &str, core: Option<u32>) {
        self.send(Command::TaskResume {
            id: id.to_string(),
            core,
        });
    }

    pub fn stop_task(&self, id: &str) {
        self.send(Command::TaskStop { id: id.to_string() });
    }

    pub fn duplicate_task(&self, id: &str) {
        self.send(Command::TaskDuplicate { id: id.to_string() });
    }

    /// Requests output past what is already held; `offset` is the number of
    /// lines the caller has.
    pub fn request_output(&self, id: &str, offset: usize) {
        self.send(Command::TaskOutputRequest {
            id: id.to_string(),
            offset,
        });
    }

    pub fn set_core_frequency(&self, frequency: u32, core: Option<u32>) {
        self.send(Command::CoreSetFrequency { frequency, core });
    }

    /// Frequency is set per voltage island; the backend applies it to every
    /// core sharing the island of the addressed core.
    pub fn set_island_frequency(&self, island: usize, frequency: u32) {
        let Some(cores) = self.voltage_islands.get(island) else {
            warn!(event = "unknown_voltage_island", island);
            return;
        };
        let Some(first) = cores.first().copied() else {
            warn!(event = "empty_voltage_island", island);
            return;
        };
        self.set_core_frequency(frequency, Some(first));
    }

    /// Asks the backend to sample `vars`. The request is parked in
    /// `pending_vars` so the acknowledging `selection_set` can promote it.
    /// Re-requesting the current selection is a no-op.
    pub fn request_selection(&self, state: &mut ChipState, vars: Vec<String>) {
        let requested: HashSet<&str> = vars.iter().map(String::as_str).collect();
        let current: HashSet<&str> = state.current_vars.iter().map(String::as_str).collect();
        if requested == current {
            debug!(event = "selection_unchanged");
            return;
        }
        state.pending_vars = vars.clone();
        self.send(Command::SelectionNew { sample_vars: vars });
    }

    /// Acknowledges a `selection_set` so the backend resumes sampling.
    pub fn confirm_selection(&self) {
        self.send(Command::SelectionSend);
    }

    pub fn resume_sim(&self) {
        self.send(Command::ResumeSim);
    }

    pub fn pause_sim(&self) {
        self.send(Command::PauseSim);
    }

    pub fn set_step(&self, step: u64) {
        self.send(Command::SetStep { step });
    }

    pub fn change_delay(&self, delay: f64) {
        self.send(Command::ChangeDelay { delay });
    }
}
