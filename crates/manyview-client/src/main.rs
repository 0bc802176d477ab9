use anyhow::Result;
use clap::Parser;
use manyview_client::config::{Cli, Config};
use manyview_client::event::ModelEvent;
use manyview_client::issuer::CommandIssuer;
use manyview_client::model::ChipState;
use manyview_client::output_log::OutputLog;
use manyview_client::router::MessageRouter;
use manyview_client::selections::SelectionStore;
use manyview_client::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_disabled = matches!(
        std::env::var("MANYVIEW_LOG_STDOUT").ok().as_deref(),
        Some("0") | Some("false") | Some("FALSE") | Some("no") | Some("NO")
    );
    if stdout_disabled {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

fn log_event(event: &ModelEvent) {
    match event {
        ModelEvent::Initialized { name, cores } => {
            info!(event = "initialized", chip = %name, cores);
        }
        ModelEvent::StatusApplied {
            chip_load,
            chip_power,
        } => {
            info!(event = "status", chip_load, chip_power);
        }
        ModelEvent::TaskAdded { id } => info!(event = "task_added", id = %id),
        ModelEvent::TaskMoved { id, core } => {
            info!(event = "task_moved", id = %id, core = ?core);
        }
        ModelEvent::TaskFinished { id, status } => {
            info!(event = "task_finished", id = %id, status = %status);
        }
        ModelEvent::TaskRemoved { id } => info!(event = "task_removed", id = %id),
        ModelEvent::TaskOutput { id, appended } => {
            info!(event = "task_output", id = %id, appended);
        }
        ModelEvent::SimData {
            kernel_cycle,
            running,
            delay,
            step,
        } => {
            info!(event = "sim_data", kernel_cycle, running, delay, step);
        }
        ModelEvent::SelectionApplied { vars } => {
            info!(event = "selection_applied", vars = vars.len());
        }
        ModelEvent::ServerFault { message } => {
            warn!(event = "server_fault", message = %message);
        }
        ModelEvent::Disconnected => info!(event = "disconnected"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = Config::load(Cli::parse());
    let selections = SelectionStore::load(&config.selections_file);

    let state = Arc::new(RwLock::new(ChipState::default()));
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(config.command_queue);
    let issuer = CommandIssuer::new(command_tx, config.voltage_islands.clone());
    let started = Arc::new(AtomicBool::new(false));
    let output_log = config
        .output_to_file
        .then(|| OutputLog::new(&config.output_folder));

    let router = MessageRouter::new(
        state.clone(),
        event_tx.clone(),
        issuer.clone(),
        started.clone(),
        output_log,
    );
    let transport = Transport::new(config.address.clone(), config.client_name.clone());
    let mut link = tokio::spawn(transport.run(router, command_rx, event_tx));

    let mut outcome: Result<()> = Ok(());
    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(ModelEvent::Disconnected) => {
                        log_event(&ModelEvent::Disconnected);
                        break;
                    }
                    Some(event) => {
                        // The headless view is ready as soon as the chip
                        // layout is known.
                        if matches!(event, ModelEvent::Initialized { .. }) {
                            started.store(true, Ordering::Relaxed);
                        }
                        log_event(&event);
                    }
                    None => break,
                }
            }
            result = &mut link => {
                // A transport error (failure to connect included) is fatal
                // and must fail the process, not just log.
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        error!(event = "link_failed", error = %err);
                        outcome = Err(err);
                    }
                    Err(err) => {
                        error!(event = "link_panicked", error = %err);
                        outcome = Err(err.into());
                    }
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "shutdown_requested");
                break;
            }
        }
    }

    link.abort();
    if let Err(err) = selections.persist() {
        warn!(event = "selection_store_persist_failed", error = %err);
    }
    outcome
}
