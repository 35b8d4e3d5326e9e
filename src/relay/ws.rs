use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::signal::{ClientSignal, ServerSignal};

use super::state::RelayState;

pub async fn handle_relay_websocket(websocket: WebSocket, state: Arc<RelayState>) {
    tracing::info!("New relay WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut handler = RelayHandler::new(state, tx);

    // Spawn task to push relayed messages to this client
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    break;
                }
                if let Ok(text) = message.to_str() {
                    handler.handle_text(text).await;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    handler.cleanup().await;
    sender_task.abort();
    tracing::info!("Relay WebSocket connection closed");
}

/// Per-connection relay logic: binds the connection to a participant id on
/// registration, then forwards and broadcasts room-scoped signals.
struct RelayHandler {
    state: Arc<RelayState>,
    sender: mpsc::UnboundedSender<Message>,
    participant_id: Option<String>,
}

impl RelayHandler {
    fn new(state: Arc<RelayState>, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            state,
            sender,
            participant_id: None,
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientSignal>(text) {
            Ok(signal) => self.handle_signal(signal).await,
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %text, "Failed to parse signal");
            }
        }
    }

    async fn handle_signal(&mut self, signal: ClientSignal) {
        match signal {
            ClientSignal::RegisterUser {
                participant_id,
                role,
            } => {
                match self
                    .state
                    .register_participant(participant_id.clone(), role, self.sender.clone())
                    .await
                {
                    Ok(()) => self.participant_id = Some(participant_id),
                    Err(e) => tracing::warn!(error = %e, "Registration refused"),
                }
            }

            ClientSignal::JoinRoom { meeting_id } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    tracing::warn!("join_room before register_user, ignoring");
                    return;
                };
                let others = self.state.join_room(&meeting_id, &participant_id).await;
                broadcast(&others, &ServerSignal::UserJoined { participant_id });
            }

            ClientSignal::LeaveRoom { meeting_id } => {
                let Some(participant_id) = self.participant_id.clone() else {
                    return;
                };
                let remaining = self.state.leave_room(&meeting_id, &participant_id).await;
                broadcast(&remaining, &ServerSignal::UserLeft { participant_id });
            }

            ClientSignal::Offer { target_id, offer } => {
                let Some(from_id) = self.participant_id.clone() else {
                    return;
                };
                self.forward(&target_id, &ServerSignal::Offer { from_id, offer })
                    .await;
            }

            ClientSignal::Answer { target_id, answer } => {
                let Some(from_id) = self.participant_id.clone() else {
                    return;
                };
                self.forward(&target_id, &ServerSignal::Answer { from_id, answer })
                    .await;
            }

            ClientSignal::IceCandidate {
                target_id,
                candidate,
            } => {
                let Some(from_id) = self.participant_id.clone() else {
                    return;
                };
                self.forward(
                    &target_id,
                    &ServerSignal::IceCandidate { from_id, candidate },
                )
                .await;
            }

            ClientSignal::SendMessage {
                meeting_id,
                sender_id,
                text,
            } => {
                // Room-wide broadcast, sender included; clients dedup the echo
                let members = self.state.room_senders(&meeting_id).await;
                broadcast(&members, &ServerSignal::ReceiveMessage { sender_id, text });
            }
        }
    }

    async fn forward(&self, target_id: &str, signal: &ServerSignal) {
        match self.state.sender_of(target_id).await {
            Some(sender) => send_signal(&sender, signal),
            None => {
                tracing::debug!(target_id = %target_id, "Dropping signal for unknown target");
            }
        }
    }

    /// On transport close: leave every joined room and notify the remaining
    /// members, covering abrupt disconnects that never sent leave_room.
    async fn cleanup(&mut self) {
        if let Some(participant_id) = self.participant_id.take() {
            let notifications = self.state.remove_participant(&participant_id).await;
            for (_meeting_id, remaining) in notifications {
                broadcast(
                    &remaining,
                    &ServerSignal::UserLeft {
                        participant_id: participant_id.clone(),
                    },
                );
            }
        }
    }
}

fn broadcast(targets: &[mpsc::UnboundedSender<Message>], signal: &ServerSignal) {
    for target in targets {
        send_signal(target, signal);
    }
}

fn send_signal(target: &mpsc::UnboundedSender<Message>, signal: &ServerSignal) {
    match serde_json::to_string(signal) {
        Ok(text) => {
            let _ = target.send(Message::text(text));
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize signal"),
    }
}
