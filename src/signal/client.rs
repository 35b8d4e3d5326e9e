use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::message::{ClientSignal, ServerSignal};
use crate::error::{MeetError, Result};

/// Events delivered from the signaling transport to its consumer
#[derive(Debug)]
pub enum SignalingEvent {
    Signal(ServerSignal),
    /// The transport dropped; sent exactly once, after the last signal
    Closed,
}

enum Outbound {
    Signal(ClientSignal),
    Close,
}

/// One persistent connection to the signaling relay.
///
/// `emit` queues signals on an ordered channel drained by a writer task; the
/// handle only exists once the WebSocket handshake has completed, so nothing
/// is ever written to a half-open transport.
pub struct SignalingClient {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SignalingClient {
    pub async fn connect(
        relay_url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SignalingEvent>)> {
        let (ws, _) = connect_async(relay_url)
            .await
            .map_err(|e| MeetError::signaling(e.to_string()))?;
        tracing::info!(url = %relay_url, "Connected to signaling relay");

        let (mut ws_sink, mut ws_stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SignalingEvent>();

        // Writer task: drains queued emissions in order
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Signal(signal) => {
                        let text = match serde_json::to_string(&signal) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to serialize outbound signal");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "Signaling send failed, stopping writer");
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader task: parses inbound frames, reports Closed exactly once
        tokio::spawn(async move {
            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerSignal>(&text) {
                        Ok(signal) => {
                            if event_tx.send(SignalingEvent::Signal(signal)).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, raw_message = %text, "Dropping unparseable signal");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Signaling transport error");
                        break;
                    }
                }
            }
            let _ = event_tx.send(SignalingEvent::Closed);
        });

        Ok((Self { outbound: outbound_tx }, event_rx))
    }

    /// Queue a signal for delivery; never blocks. Signals queued after the
    /// transport dropped are discarded with a log line.
    pub fn emit(&self, signal: ClientSignal) {
        if self.outbound.send(Outbound::Signal(signal)).is_err() {
            tracing::debug!("Signaling writer stopped, dropping outbound signal");
        }
    }

    /// Send a close frame and stop the writer. Safe to call more than once.
    pub fn disconnect(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
