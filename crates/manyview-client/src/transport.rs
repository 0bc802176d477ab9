use crate::event::ModelEvent;
use crate::router::MessageRouter;
use anyhow::{Context, Result};
use manyview_proto::{encode_frame, Command, Envelope, LineFramer, DEFAULT_MAX_FRAME_BYTES};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// TCP link to the backend. Connects once, sends the `client_init`
/// handshake, then multiplexes inbound frames and outbound commands on one
/// task. When the peer closes the stream the transport drains the framer,
/// emits [`ModelEvent::Disconnected`], and returns; there is no reconnect.
pub struct Transport {
    address: String,
    client_name: String,
    running: Arc<AtomicBool>,
}

impl Transport {
    pub fn new(address: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client_name: client_name.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True between a successful handshake and stream teardown.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub async fn run(
        self,
        mut router: MessageRouter,
        mut command_rx: mpsc::Receiver<Command>,
        events: mpsc::Sender<ModelEvent>,
    ) -> Result<()> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("connect to backend at {}", self.address))?;
        info!(event = "connected", address = %self.address);

        let (reader_half, mut writer_half) = stream.into_split();
        let hello = Command::ClientInit {
            name: self.client_name.clone(),
        }
        .into_envelope();
        send_envelope(&mut writer_half, &hello)
            .await
            .context("send client_init")?;
        self.running.store(true, Ordering::SeqCst);

        let mut reader = BufReader::new(reader_half);
        let mut framer = LineFramer::default();
        let mut read_buf = [0u8; 8192];
        let mut command_open = true;

        loop {
            tokio::select! {
                read = reader.read(&mut read_buf) => {
                    let read = match read {
                        Ok(value) => value,
                        Err(err) => {
                            warn!(event = "read_error", error = %err);
                            break;
                        }
                    };
                    if read == 0 {
                        break;
                    }
                    let batch = framer.push_chunk(&read_buf[..read]);
                    for err in batch.errors {
                        warn!(event = "frame_error", error = %err);
                    }
                    for frame in batch.frames {
                        router.handle_frame(&frame).await;
                    }
                }
                maybe_command = command_rx.recv(), if command_open => {
                    match maybe_command {
                        Some(command) => {
                            let envelope = command.into_envelope();
                            if let Err(err) = send_envelope(&mut writer_half, &envelope).await {
                                warn!(event = "write_error", error = %err);
                                break;
                            }
                        }
                        None => {
                            command_open = false;
                        }
                    }
                }
            }
        }

        // A final frame may arrive without its newline right before EOF.
        let batch = framer.finish();
        for err in batch.errors {
            warn!(event = "frame_error", error = %err);
        }
        for frame in batch.frames {
            router.handle_frame(&frame).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!(event = "disconnected", address = %self.address);
        let _ = events.send(ModelEvent::Disconnected).await;
        Ok(())
    }
}

async fn send_envelope(writer: &mut OwnedWriteHalf, envelope: &Envelope) -> io::Result<()> {
    let frame = encode_frame(envelope, DEFAULT_MAX_FRAME_BYTES)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::CommandIssuer;
    use crate::model::ChipState;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};
    use tokio::net::TcpListener;
    use tokio::sync::RwLock;

    fn envelope_line(kind: &str, content: serde_json::Value) -> Vec<u8> {
        let mut line = serde_json::to_vec(&json!({"type": kind, "content": content})).unwrap();
        line.push(b'\n');
        line
    }

    #[tokio::test]
    async fn handshake_stream_and_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = TokioBufReader::new(read_half).lines();

            // Handshake must come first.
            let first = lines.next_line().await.unwrap().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&first).unwrap();
            assert_eq!(parsed["type"], "client_init");
            assert_eq!(parsed["content"]["name"], "itest");

            write_half
                .write_all(&envelope_line(
                    "server_init",
                    json!({
                        "name": "scc48",
                        "cores": 1,
                        "sample_vars": [],
                        "default_vars": [],
                    }),
                ))
                .await
                .unwrap();
            write_half
                .write_all(&envelope_line(
                    "status",
                    json!({"chip": {
                        "Cores": [{"CPU": 30.0, "MEM": 5.0, "Frequency": 533.0, "Voltage": 1.0}],
                        "Tasks": [],
                        "Power": 42.0,
                    }}),
                ))
                .await
                .unwrap();

            // Next line must be the queued command.
            let second = lines.next_line().await.unwrap().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&second).unwrap();
            assert_eq!(parsed["type"], "pause_sim");
            // Closing the socket ends the client loop.
        });

        let state = Arc::new(RwLock::new(ChipState::default()));
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(64);
        let issuer = CommandIssuer::new(command_tx.clone(), vec![]);
        let started = Arc::new(AtomicBool::new(true));
        let router = MessageRouter::new(
            state.clone(),
            event_tx.clone(),
            issuer.clone(),
            started,
            None,
        );

        let transport = Transport::new(address, "itest");
        let running = transport.running_flag();
        let client = tokio::spawn(transport.run(router, command_rx, event_tx));

        assert_eq!(
            event_rx.recv().await.unwrap(),
            ModelEvent::Initialized {
                name: "scc48".into(),
                cores: 1,
            }
        );
        let status = event_rx.recv().await.unwrap();
        assert!(matches!(status, ModelEvent::StatusApplied { .. }));
        assert!(running.load(Ordering::SeqCst));
        assert!((state.read().await.chip_load - 0.3).abs() < 1e-9);

        issuer.pause_sim();

        server.await.unwrap();
        assert_eq!(event_rx.recv().await.unwrap(), ModelEvent::Disconnected);
        client.await.unwrap().unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn connect_failure_is_an_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let state = Arc::new(RwLock::new(ChipState::default()));
        let (event_tx, _event_rx) = mpsc::channel(4);
        let (command_tx, command_rx) = mpsc::channel(4);
        let issuer = CommandIssuer::new(command_tx, vec![]);
        let started = Arc::new(AtomicBool::new(true));
        let router = MessageRouter::new(state, event_tx.clone(), issuer, started, None);

        let transport = Transport::new(address, "itest");
        let result = transport.run(router, command_rx, event_tx).await;
        assert!(result.is_err());
    }
}
