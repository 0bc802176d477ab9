use crate::telemetry::TelemetryMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Task lifecycle states as reported by the backend. The wire carries free
/// strings; anything unrecognized is preserved verbatim in `Other` so a newer
/// backend does not get its tasks dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    New,
    Running,
    Paused,
    Stopped,
    Finished,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "New" => Self::New,
            "Running" => Self::Running,
            "Paused" => Self::Paused,
            "Stopped" => Self::Stopped,
            "Finished" => Self::Finished,
            "Failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "New",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
            Self::Other(raw) => raw,
        }
    }

    /// Finished and Failed tasks move to the finished shelf; they never run
    /// again under the same id.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Whether the task counts toward a core's running total.
    pub fn counts_as_running(&self) -> bool {
        !matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }
}

impl FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(raw))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One core of the chip. Loads are normalized to [0, 1].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreUnit {
    pub index: usize,
    pub load: f64,
    pub mem: f64,
    pub frequency: f64,
    pub voltage: f64,
    /// Tasks on this core that are not Finished, Failed, or Stopped.
    pub running_count: usize,
    /// Ids of tasks assigned here. The owning side of the assignment; each
    /// task's `core` field is the mirror lookup.
    pub tasks: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    /// None while the task sits on the shelf, unassigned.
    pub core: Option<usize>,
    pub status: TaskStatus,
    pub load_cpu: f64,
    pub load_mem: f64,
    /// Accumulated output lines; its length doubles as the offset for the
    /// next incremental output request.
    pub output: Vec<String>,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, core: Option<usize>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            core,
            status: TaskStatus::New,
            load_cpu: 0.0,
            load_mem: 0.0,
            output: Vec::new(),
        }
    }

    /// Locally created tasks carry a `P`-prefixed placeholder id until the
    /// backend assigns a real one.
    pub fn is_pending(&self) -> bool {
        self.id.starts_with('P')
    }

    pub fn output_offset(&self) -> usize {
        self.output.len()
    }
}

/// A task created locally that the backend has not confirmed yet. It gets a
/// `P`-prefixed placeholder id; once a `status` snapshot reports the real
/// task, the placeholder is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub id: String,
    pub name: String,
    pub program: String,
}

/// Simulator control readout from the latest `sim_data` message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimControl {
    pub running: bool,
    pub delay: f64,
    pub step: i64,
}

/// The reconciled view of the backend. One instance per connection; the
/// receive loop is its only writer.
#[derive(Debug, Clone, Default)]
pub struct ChipState {
    pub name: String,
    pub orientation: Option<String>,
    pub cores: Vec<CoreUnit>,
    pub tasks: BTreeMap<String, TaskRecord>,
    /// Terminal tasks, kept after the backend stops reporting them so their
    /// names and output stay inspectable.
    pub finished: BTreeMap<String, TaskRecord>,
    /// Locally created tasks awaiting backend confirmation.
    pub pending_tasks: BTreeMap<String, PendingTask>,
    pending_seq: u64,
    /// Mean of all core loads, [0, 1].
    pub chip_load: f64,
    pub chip_power: f64,
    /// Variables the backend can sample.
    pub sample_vars: Vec<String>,
    /// Variables currently being sampled.
    pub current_vars: Vec<String>,
    /// Selection sent to the backend but not yet acknowledged.
    pub pending_vars: Vec<String>,
    pub sim: SimControl,
    pub current_kernel_cycle: f64,
    pub previous_kernel_cycle: f64,
    pub telemetry: TelemetryMap,
}

impl ChipState {
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn has_task(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Lays out `count` idle cores for the `server_init` handler. A repeated
    /// `server_init` re-announces the chip, so task state held for the old
    /// layout goes with it; stale core indexes must not survive a relayout.
    pub fn init_cores(&mut self, count: usize) {
        self.tasks.clear();
        self.finished.clear();
        self.pending_tasks.clear();
        self.chip_load = 0.0;
        self.chip_power = 0.0;
        self.current_kernel_cycle = 0.0;
        self.previous_kernel_cycle = 0.0;
        self.cores = (0..count)
            .map(|index| CoreUnit {
                index,
                ..CoreUnit::default()
            })
            .collect();
    }

    /// A core index the current layout cannot hold is treated as unassigned.
    fn valid_core(&self, core: Option<usize>) -> Option<usize> {
        core.filter(|index| *index < self.cores.len())
    }

    fn attach(&mut self, id: &str, core: Option<usize>) {
        if let Some(unit) = core.and_then(|index| self.cores.get_mut(index)) {
            unit.tasks.insert(id.to_string());
        }
    }

    fn detach(&mut self, id: &str, core: Option<usize>) {
        if let Some(unit) = core.and_then(|index| self.cores.get_mut(index)) {
            unit.tasks.remove(id);
        }
    }

    pub fn add_task(&mut self, id: &str, name: &str, core: Option<usize>, status: TaskStatus) {
        let core = self.valid_core(core);
        let mut record = TaskRecord::new(id, name, core);
        record.status = status;
        self.tasks.insert(id.to_string(), record);
        self.attach(id, core);
        debug_assert!(self.check_consistency().is_ok());
    }

    /// Reassigns a task. `None` detaches it to the shelf.
    pub fn move_task(&mut self, id: &str, dest: Option<usize>) {
        let dest = self.valid_core(dest);
        let Some(record) = self.tasks.get_mut(id) else {
            return;
        };
        let previous = record.core;
        record.core = dest;
        self.detach(id, previous);
        self.attach(id, dest);
        debug_assert!(self.check_consistency().is_ok());
    }

    /// Marks a task terminal: detached from its core and mirrored onto the
    /// finished shelf, output included.
    pub fn finish_task(&mut self, id: &str, status: TaskStatus) {
        let Some(record) = self.tasks.get_mut(id) else {
            return;
        };
        let previous = record.core;
        record.core = None;
        record.status = status;
        let shelved = record.clone();
        self.detach(id, previous);
        self.finished.insert(id.to_string(), shelved);
        debug_assert!(self.check_consistency().is_ok());
    }

    /// Drops a task the backend no longer reports. A terminal task's final
    /// record, output included, replaces the finished shelf's copy.
    pub fn remove_task(&mut self, id: &str) {
        if let Some(record) = self.tasks.remove(id) {
            self.detach(id, record.core);
            if record.status.is_terminal() {
                self.finished.insert(id.to_string(), record);
            }
        }
        debug_assert!(self.check_consistency().is_ok());
    }

    /// Registers a locally created task under a fresh placeholder id.
    pub fn add_pending_task(&mut self, name: &str, program: &str) -> String {
        self.pending_seq += 1;
        let id = format!("P{}", self.pending_seq);
        self.pending_tasks.insert(
            id.clone(),
            PendingTask {
                id: id.clone(),
                name: name.to_string(),
                program: program.to_string(),
            },
        );
        id
    }

    /// Drops the placeholder once the backend reports the real task.
    pub fn resolve_pending_task(&mut self, id: &str) -> Option<PendingTask> {
        self.pending_tasks.remove(id)
    }

    /// Re-creates a pending task's name and program under a fresh
    /// placeholder id.
    pub fn duplicate_pending_task(&mut self, id: &str) -> Option<String> {
        let entry = self.pending_tasks.get(id)?;
        let (name, program) = (entry.name.clone(), entry.program.clone());
        Some(self.add_pending_task(&name, &program))
    }

    /// Verifies the assignment invariant in both directions: a task's `core`
    /// field and the cores' task sets must mirror each other exactly.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (id, record) in &self.tasks {
            if let Some(core) = record.core {
                let Some(unit) = self.cores.get(core) else {
                    return Err(format!("task {id} assigned to missing core {core}"));
                };
                if !unit.tasks.contains(id) {
                    return Err(format!("task {id} missing from core {core} task set"));
                }
            }
        }
        for unit in &self.cores {
            for id in &unit.tasks {
                match self.tasks.get(id) {
                    Some(record) if record.core == Some(unit.index) => {}
                    Some(_) => {
                        return Err(format!(
                            "core {} lists task {id} assigned elsewhere",
                            unit.index
                        ));
                    }
                    None => {
                        return Err(format!("core {} lists unknown task {id}", unit.index));
                    }
                }
            }
        }
        Ok(())
    }
}
