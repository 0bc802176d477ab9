use crate::event::ModelEvent;
use crate::issuer::CommandIssuer;
use crate::model::ChipState;
use crate::output_log::OutputLog;
use crate::reconcile;
use manyview_proto::{decode_frame, ProtocolError, ServerMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Dispatches decoded frames into the model. Owned by the receive loop,
/// which makes it the sole writer of the shared [`ChipState`].
///
/// Sequencing rules: nothing but `server_init` is accepted before the
/// handshake completes, and after it completes messages are only applied
/// while the view reports itself started. A bad frame is logged and dropped;
/// it never tears down the connection.
pub struct MessageRouter {
    state: Arc<RwLock<ChipState>>,
    events: mpsc::Sender<ModelEvent>,
    issuer: CommandIssuer,
    started: Arc<AtomicBool>,
    output_log: Option<OutputLog>,
    initialized: bool,
}

impl MessageRouter {
    pub fn new(
        state: Arc<RwLock<ChipState>>,
        events: mpsc::Sender<ModelEvent>,
        issuer: CommandIssuer,
        started: Arc<AtomicBool>,
        output_log: Option<OutputLog>,
    ) -> Self {
        Self {
            state,
            events,
            issuer,
            started,
            output_log,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub async fn handle_frame(&mut self, frame: &[u8]) {
        let envelope = match decode_frame(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event = "malformed_frame", error = %err);
                return;
            }
        };

        let message = match ServerMessage::from_envelope(&envelope) {
            Ok(message) => message,
            Err(err @ ProtocolError::InvalidMessage(_)) => {
                warn!(event = "invalid_frame", kind = %envelope.kind, error = %err);
                return;
            }
            Err(err) => {
                warn!(event = "malformed_frame", kind = %envelope.kind, error = %err);
                return;
            }
        };

        if !self.initialized && !matches!(message, ServerMessage::ServerInit(_)) {
            warn!(event = "message_before_init", kind = message.kind());
            return;
        }
        if self.initialized && !self.started.load(Ordering::Relaxed) {
            debug!(event = "message_before_start", kind = message.kind());
            return;
        }

        let events = self.apply(message).await;
        for event in events {
            let _ = self.events.send(event).await;
        }
    }

    async fn apply(&mut self, message: ServerMessage) -> Vec<ModelEvent> {
        let mut state = self.state.write().await;
        match message {
            ServerMessage::ServerInit(payload) => {
                let events = reconcile::apply_server_init(&mut state, &payload);
                self.initialized = true;
                events
            }
            ServerMessage::Status(payload) => reconcile::apply_status(&mut state, &payload),
            ServerMessage::TaskOutput(payload) => {
                let events = reconcile::apply_task_output(&mut state, &payload);
                // Mirror to disk only when the model accepted the lines.
                if !events.is_empty() {
                    if let Some(log) = &self.output_log {
                        if let Err(err) = log.append(&payload.id, &payload.output) {
                            warn!(event = "output_log_write_failed", id = %payload.id, error = %err);
                        }
                    }
                }
                events
            }
            ServerMessage::SimData(payload) => {
                if payload.kernel_cycle().is_none() {
                    warn!(event = "sim_data_missing_cycle");
                    return Vec::new();
                }
                reconcile::apply_sim_data(&mut state, &payload)
            }
            ServerMessage::SelectionSet(payload) => {
                let events = reconcile::apply_selection_set(&mut state, &payload);
                // The backend waits for this acknowledgement before sampling
                // with the new selection.
                self.issuer.confirm_selection();
                events
            }
            ServerMessage::InvalidMessage(note) => {
                warn!(event = "backend_rejected_command", message = %note.message);
                vec![ModelEvent::ServerFault {
                    message: note.message,
                }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manyview_proto::Command;
    use serde_json::json;

    struct Harness {
        router: MessageRouter,
        events: mpsc::Receiver<ModelEvent>,
        commands: mpsc::Receiver<Command>,
        state: Arc<RwLock<ChipState>>,
        started: Arc<AtomicBool>,
    }

    fn harness() -> Harness {
        let state = Arc::new(RwLock::new(ChipState::default()));
        let (event_tx, events) = mpsc::channel(64);
        let (command_tx, commands) = mpsc::channel(64);
        let started = Arc::new(AtomicBool::new(true));
        let issuer = CommandIssuer::new(command_tx, vec![vec![0]]);
        let router = MessageRouter::new(
            state.clone(),
            event_tx,
            issuer,
            started.clone(),
            None,
        );
        Harness {
            router,
            events,
            commands,
            state,
            started,
        }
    }

    fn frame(kind: &str, content: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({"type": kind, "content": content})).unwrap()
    }

    fn init_frame() -> Vec<u8> {
        frame(
            "server_init",
            json!({
                "name": "scc48",
                "cores": 2,
                "sample_vars": ["cpu0:insn"],
                "default_vars": ["cpu0:insn"],
            }),
        )
    }

    #[tokio::test]
    async fn data_before_init_is_discarded() {
        let mut h = harness();
        h.router
            .handle_frame(&frame(
                "status",
                json!({"chip": {"Cores": [], "Tasks": [], "Power": 0.0}}),
            ))
            .await;
        assert!(h.events.try_recv().is_err());
        assert!(!h.router.is_initialized());

        h.router.handle_frame(&init_frame()).await;
        assert!(h.router.is_initialized());
        assert_eq!(
            h.events.try_recv().unwrap(),
            ModelEvent::Initialized {
                name: "scc48".into(),
                cores: 2,
            }
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_do_not_stop_the_stream() {
        let mut h = harness();
        h.router.handle_frame(b"{garbage").await;
        h.router.handle_frame(b"{\"type\": \"mystery\", \"content\": {}}").await;
        h.router
            .handle_frame(&frame("server_init", json!({"cores": "bad"})))
            .await;

        h.router.handle_frame(&init_frame()).await;
        assert!(h.router.is_initialized());
    }

    #[tokio::test]
    async fn messages_are_dropped_until_view_starts() {
        let mut h = harness();
        h.router.handle_frame(&init_frame()).await;
        h.events.try_recv().unwrap();

        h.started.store(false, Ordering::Relaxed);
        h.router
            .handle_frame(&frame(
                "status",
                json!({"chip": {"Cores": [{"CPU": 50.0, "MEM": 0.0, "Frequency": 533.0, "Voltage": 1.0}, {"CPU": 50.0, "MEM": 0.0, "Frequency": 533.0, "Voltage": 1.0}], "Tasks": [], "Power": 1.0}}),
            ))
            .await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.state.read().await.chip_load, 0.0);

        h.started.store(true, Ordering::Relaxed);
        h.router
            .handle_frame(&frame(
                "status",
                json!({"chip": {"Cores": [{"CPU": 50.0, "MEM": 0.0, "Frequency": 533.0, "Voltage": 1.0}, {"CPU": 50.0, "MEM": 0.0, "Frequency": 533.0, "Voltage": 1.0}], "Tasks": [], "Power": 1.0}}),
            ))
            .await;
        assert_eq!(h.state.read().await.chip_load, 0.5);
    }

    #[tokio::test]
    async fn selection_set_is_acknowledged() {
        let mut h = harness();
        h.router.handle_frame(&init_frame()).await;
        h.state.write().await.pending_vars = vec!["cpu1:insn".into()];

        h.router
            .handle_frame(&frame(
                "selection_set",
                json!({"sample_vars": ["cpu0:insn", "cpu1:insn"]}),
            ))
            .await;

        assert_eq!(h.commands.try_recv().unwrap(), Command::SelectionSend);
        assert_eq!(
            h.state.read().await.current_vars,
            vec!["cpu1:insn".to_string()]
        );
    }

    #[tokio::test]
    async fn backend_rejection_surfaces_as_fault_event() {
        let mut h = harness();
        h.router.handle_frame(&init_frame()).await;
        h.events.try_recv().unwrap();

        h.router
            .handle_frame(&frame("invalid_message", json!({"message": "no such task"})))
            .await;
        assert_eq!(
            h.events.try_recv().unwrap(),
            ModelEvent::ServerFault {
                message: "no such task".into(),
            }
        );
    }

    #[tokio::test]
    async fn sim_data_without_cycle_counter_is_dropped() {
        let mut h = harness();
        h.router.handle_frame(&init_frame()).await;
        h.events.try_recv().unwrap();

        h.router
            .handle_frame(&frame(
                "sim_data",
                json!({"data": {"cpu0:insn": 1.0}, "status": {"delay": 0.5, "sim": 1, "step": 1}}),
            ))
            .await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.state.read().await.current_kernel_cycle, 0.0);
    }
}
