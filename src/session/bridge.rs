//! JSON-lines transport to the protocol bridge.
//!
//! The bridge process owns the game connection and its encoding. Each inbound
//! line is one [`SessionEvent`], each outbound line is one [`Command`].

use super::{Command, CommandSink, SessionEvent};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Command sink backed by an unbounded channel, so `send` never blocks.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }
}

impl CommandSink for ChannelSink {
    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Session writer gone, dropping command");
        }
    }
}

/// Connected bridge: command sink, event stream and the two pump tasks.
pub struct BridgeSession {
    pub sink: Arc<ChannelSink>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub handle: BridgeHandle,
}

/// Owns the reader/writer tasks of a bridge connection.
pub struct BridgeHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Stop both pumps. Pending commands are dropped.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl BridgeSession {
    /// Connect to a bridge listening on `address` (host:port).
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("Failed to connect to protocol bridge at {}", address))?;
        stream.set_nodelay(true).ok();
        info!(address = %address, "Connected to protocol bridge");
        Ok(Self::from_stream(stream))
    }

    /// Run the JSON-lines pumps over an arbitrary byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();

        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let mut line = match serde_json::to_vec(&command) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Failed to encode command, skipping");
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = write_half.write_all(&line).await {
                    error!(error = %e, "Failed to write to protocol bridge");
                    break;
                }
            }
            debug!("Bridge writer stopped");
        });

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<SessionEvent>(&line) {
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    break "event consumer gone".to_string();
                                }
                            }
                            Err(e) => warn!(error = %e, "Malformed event from bridge, skipping"),
                        }
                    }
                    Ok(None) => break "bridge closed the connection".to_string(),
                    Err(e) => break format!("bridge read error: {}", e),
                }
            };
            let _ = event_tx.send(SessionEvent::Disconnected { reason });
        });

        Self {
            sink: Arc::new(ChannelSink::new(command_tx)),
            events: event_rx,
            handle: BridgeHandle {
                tasks: vec![writer, reader],
            },
        }
    }
}
