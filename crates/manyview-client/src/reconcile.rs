//! Applies decoded backend messages to the shared [`ChipState`], diffing
//! each full-state snapshot against what is already held locally.

use crate::event::ModelEvent;
use crate::model::{ChipState, TaskStatus};
use manyview_proto::{
    SelectionSetPayload, ServerInitPayload, SimDataPayload, StatusPayload, TaskOutputPayload,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

pub fn apply_server_init(state: &mut ChipState, payload: &ServerInitPayload) -> Vec<ModelEvent> {
    state.name = payload.name.clone();
    state.orientation = payload.orientation.clone();
    state.init_cores(payload.cores);
    state.sample_vars = payload.sample_vars.clone();
    state.current_vars = payload.default_vars.clone();
    let vars = state.current_vars.clone();
    state.telemetry.rebuild_from_selection(&vars);

    info!(
        event = "chip_initialized",
        name = %payload.name,
        cores = payload.cores,
    );

    vec![ModelEvent::Initialized {
        name: payload.name.clone(),
        cores: payload.cores,
    }]
}

/// Reconciles one `status` snapshot. Order matters: core loads first, then
/// the task diff, then per-core running counters, then removal of tasks the
/// snapshot no longer mentions.
pub fn apply_status(state: &mut ChipState, payload: &StatusPayload) -> Vec<ModelEvent> {
    let mut events = Vec::new();

    // Step 1: core loads. The wire reports percent; the model holds [0, 1].
    for core in state.cores.iter_mut() {
        let Some(report) = payload.chip.cores.get(core.index) else {
            warn!(
                event = "core_report_missing",
                core = core.index,
                reported = payload.chip.cores.len(),
            );
            continue;
        };
        core.load = report.cpu / 100.0;
        core.mem = report.mem / 100.0;
        core.frequency = report.frequency;
        core.voltage = report.voltage;
    }

    // Step 2: task diff against the local map.
    let mut seen = HashSet::new();
    let mut running_per_core: HashMap<usize, usize> = HashMap::new();
    for entry in &payload.chip.tasks {
        let status = TaskStatus::parse(&entry.status);
        // A core index outside the layout counts as unassigned.
        let reported_core = entry
            .core_index()
            .filter(|index| *index < state.cores.len());

        if state.has_task(&entry.id) {
            let previous = &state.tasks[&entry.id];
            let was_terminal = previous.status.is_terminal();
            let previous_core = previous.core;

            if status.is_terminal() && !was_terminal {
                state.finish_task(&entry.id, status.clone());
                events.push(ModelEvent::TaskFinished {
                    id: entry.id.clone(),
                    status: status.clone(),
                });
            } else if !status.is_terminal() && previous_core != reported_core {
                state.move_task(&entry.id, reported_core);
                events.push(ModelEvent::TaskMoved {
                    id: entry.id.clone(),
                    core: reported_core,
                });
            }
        } else {
            state.add_task(&entry.id, &entry.name, reported_core, status.clone());
            if state.resolve_pending_task(&entry.id).is_none() && entry.id.starts_with('P') {
                debug!(event = "pending_task_confirmed_unknown", id = %entry.id);
            }
            events.push(ModelEvent::TaskAdded {
                id: entry.id.clone(),
            });
        }

        if status.counts_as_running() {
            if let Some(core) = reported_core {
                *running_per_core.entry(core).or_insert(0) += 1;
            }
        }

        seen.insert(entry.id.clone());
        if let Some(record) = state.tasks.get_mut(&entry.id) {
            record.status = status;
            // Per-task loads are only meaningful while the task holds a core.
            if record.core.is_some() {
                record.load_cpu = entry.cpu;
                record.load_mem = entry.mem;
            }
        }
    }

    // Step 3: per-core running counters.
    for core in state.cores.iter_mut() {
        core.running_count = running_per_core.get(&core.index).copied().unwrap_or(0);
    }

    // Step 4: drop tasks absent from this snapshot.
    let absent: Vec<String> = state
        .tasks
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    for id in absent {
        debug!(event = "task_gone", id = %id);
        state.remove_task(&id);
        events.push(ModelEvent::TaskRemoved { id });
    }

    // Mean over every core, including retained loads for cores a short
    // snapshot skipped.
    if !state.cores.is_empty() {
        let total_load: f64 = state.cores.iter().map(|core| core.load).sum();
        state.chip_load = total_load / state.cores.len() as f64;
    }
    state.chip_power = payload.chip.power;
    debug!(
        event = "status_applied",
        chip_load = state.chip_load,
        chip_power = state.chip_power,
    );
    events.push(ModelEvent::StatusApplied {
        chip_load: state.chip_load,
        chip_power: state.chip_power,
    });
    events
}

/// Appends incremental output lines. An id the model does not know refers to
/// a task that is already gone; the message is dropped without comment.
pub fn apply_task_output(state: &mut ChipState, payload: &TaskOutputPayload) -> Vec<ModelEvent> {
    let Some(record) = state.tasks.get_mut(&payload.id) else {
        return Vec::new();
    };
    if payload.output.is_empty() {
        return Vec::new();
    }
    record.output.extend(payload.output.iter().cloned());
    vec![ModelEvent::TaskOutput {
        id: payload.id.clone(),
        appended: payload.output.len(),
    }]
}

/// Applies one telemetry batch. The caller has already verified the batch
/// carries a kernel cycle counter.
pub fn apply_sim_data(state: &mut ChipState, payload: &SimDataPayload) -> Vec<ModelEvent> {
    let Some(cycle) = payload.kernel_cycle() else {
        return Vec::new();
    };
    state.previous_kernel_cycle = state.current_kernel_cycle;
    state.current_kernel_cycle = cycle;
    let cycle_delta = state.current_kernel_cycle - state.previous_kernel_cycle;

    state.sim.running = payload.status.is_running();
    state.sim.delay = payload.status.delay;
    state.sim.step = payload.status.step;

    let applied = state.telemetry.apply_batch(&payload.data, cycle_delta);
    debug!(
        event = "sim_data_applied",
        kernel_cycle = cycle,
        samples = applied,
    );

    vec![ModelEvent::SimData {
        kernel_cycle: cycle,
        running: state.sim.running,
        delay: state.sim.delay,
        step: state.sim.step,
    }]
}

/// The backend acknowledged a new sampling selection: promote the pending
/// variable set and rebuild the telemetry series from scratch.
pub fn apply_selection_set(
    state: &mut ChipState,
    payload: &SelectionSetPayload,
) -> Vec<ModelEvent> {
    state.sample_vars = payload.sample_vars.clone();
    state.current_vars = std::mem::take(&mut state.pending_vars);
    let vars = state.current_vars.clone();
    state.telemetry.rebuild_from_selection(&vars);

    info!(event = "selection_applied", vars = state.current_vars.len());
    vec![ModelEvent::SelectionApplied {
        vars: state.current_vars.clone(),
    }]
}
