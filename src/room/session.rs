use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::IceConfig;
use crate::error::{MeetError, Result};
use crate::media::{CaptureSource, LocalMediaController};
use crate::signal::{ClientSignal, ParticipantRole, ServerSignal, SignalingClient, SignalingEvent};

use super::chat::{ChatChannel, ChatMessage};
use super::peers::{LinkEvent, PeerManager};
use super::rtc;

/// Room session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Active,
    Leaving,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Leaving => "leaving",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Signaling transport status, independent of the lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// A known member of the room, keyed by its stable participant id. The local
/// participant is kept in the same roster under its real id.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    /// Known for the local participant; remote roles are not carried by the
    /// wire contract
    pub role: Option<ParticipantRole>,
    /// Absent until the first remote track arrives
    pub stream_id: Option<String>,
}

/// Everything the presentation layer needs to render the room
pub enum RoomEvent {
    StateChanged(SessionState),
    StatusChanged(ConnectionStatus),
    MediaReady {
        video: bool,
        audio: bool,
    },
    MediaFailed {
        error: String,
    },
    ParticipantJoined {
        participant_id: String,
    },
    ParticipantLeft {
        participant_id: String,
    },
    TrackAdded {
        participant_id: String,
        stream_id: String,
        kind: RTPCodecType,
        track: Arc<TrackRemote>,
    },
    LinkStatus {
        participant_id: String,
        state: RTCPeerConnectionState,
    },
    Chat(ChatMessage),
}

impl fmt::Debug for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomEvent::StateChanged(state) => write!(f, "StateChanged({:?})", state),
            RoomEvent::StatusChanged(status) => write!(f, "StatusChanged({:?})", status),
            RoomEvent::MediaReady { video, audio } => {
                write!(f, "MediaReady {{ video: {}, audio: {} }}", video, audio)
            }
            RoomEvent::MediaFailed { error } => write!(f, "MediaFailed {{ error: {} }}", error),
            RoomEvent::ParticipantJoined { participant_id } => {
                write!(f, "ParticipantJoined({})", participant_id)
            }
            RoomEvent::ParticipantLeft { participant_id } => {
                write!(f, "ParticipantLeft({})", participant_id)
            }
            RoomEvent::TrackAdded {
                participant_id,
                stream_id,
                kind,
                ..
            } => write!(
                f,
                "TrackAdded {{ participant: {}, stream: {}, kind: {:?} }}",
                participant_id, stream_id, kind
            ),
            RoomEvent::LinkStatus {
                participant_id,
                state,
            } => write!(f, "LinkStatus {{ participant: {}, state: {:?} }}", participant_id, state),
            RoomEvent::Chat(message) => write!(f, "Chat({:?})", message),
        }
    }
}

/// Session configuration for one meeting view
pub struct RoomConfig {
    pub meeting_id: String,
    pub participant_id: String,
    pub role: ParticipantRole,
    pub relay_url: String,
    pub ice: IceConfig,
}

enum Command {
    SendChat(String),
    ToggleCamera,
    ToggleMic,
    Leave,
}

/// User-action side of a running session. Dropping the handle is treated as
/// the view unmounting: the session tears down and reaches `Closed`.
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RoomHandle {
    pub fn send_chat(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::SendChat(text.into()));
    }

    pub fn toggle_camera(&self) {
        let _ = self.commands.send(Command::ToggleCamera);
    }

    pub fn toggle_mic(&self) {
        let _ = self.commands.send(Command::ToggleMic);
    }

    pub fn leave(&self) {
        let _ = self.commands.send(Command::Leave);
    }
}

/// One meeting-room session: owns the signaling connection, the link table,
/// the local media and the chat transcript for the lifetime of one room view.
pub struct RoomSession {
    config: RoomConfig,
    state: SessionState,
    status: ConnectionStatus,
    signaling: Option<SignalingClient>,
    peers: PeerManager,
    media: Option<LocalMediaController>,
    chat: ChatChannel,
    roster: HashMap<String, Participant>,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomSession {
    /// Mount a room view: spawns the session task and returns the handle and
    /// the event stream the presentation layer renders from. Failures after
    /// this point surface as events, never as panics.
    pub fn join(
        config: RoomConfig,
        capture: Box<dyn CaptureSource>,
    ) -> Result<(RoomHandle, mpsc::UnboundedReceiver<RoomEvent>)> {
        if config.meeting_id.is_empty() {
            return Err(MeetError::EmptyMeetingId);
        }
        if config.participant_id.is_empty() {
            return Err(MeetError::InvalidConfiguration(
                "participant id must not be empty".to_string(),
            ));
        }

        let api = rtc::build_api()?;
        let ice_servers = rtc::ice_servers_from(&config.ice);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let peers = PeerManager::new(
            api,
            ice_servers,
            config.participant_id.clone(),
            outbox_tx,
            link_tx,
        );
        let chat = ChatChannel::new(config.meeting_id.clone(), config.participant_id.clone());

        let mut roster = HashMap::new();
        roster.insert(
            config.participant_id.clone(),
            Participant {
                id: config.participant_id.clone(),
                role: Some(config.role),
                stream_id: None,
            },
        );

        let session = RoomSession {
            config,
            state: SessionState::Idle,
            status: ConnectionStatus::Connecting,
            signaling: None,
            peers,
            media: None,
            chat,
            roster,
            events: event_tx,
        };

        tokio::spawn(session.run(capture, command_rx, outbox_rx, link_rx));

        Ok((RoomHandle { commands: command_tx }, event_rx))
    }

    async fn run(
        mut self,
        capture: Box<dyn CaptureSource>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outbox: mpsc::UnboundedReceiver<ClientSignal>,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        self.set_state(SessionState::Joining);

        // Local media acquisition runs in parallel with the signaling
        // handshake; its outcome arrives as an event on the loop below.
        let (media_tx, mut media_rx) = mpsc::unbounded_channel();
        let participant_id = self.config.participant_id.clone();
        tokio::spawn(async move {
            let mut media = LocalMediaController::new(participant_id);
            let result = media.acquire(capture);
            let _ = media_tx.send((media, result));
        });

        let mut signal_rx = match SignalingClient::connect(&self.config.relay_url).await {
            Ok((client, signal_rx)) => {
                client.emit(ClientSignal::RegisterUser {
                    participant_id: self.config.participant_id.clone(),
                    role: self.config.role,
                });
                client.emit(ClientSignal::JoinRoom {
                    meeting_id: self.config.meeting_id.clone(),
                });
                self.signaling = Some(client);
                self.set_status(ConnectionStatus::Connected);
                self.set_state(SessionState::Active);
                Some(signal_rx)
            }
            Err(e) => {
                // The room stays in Joining; only a leave can move it on
                tracing::error!(error = %e, "Signaling relay unreachable");
                self.set_status(ConnectionStatus::Disconnected);
                None
            }
        };

        let mut signaling_open = signal_rx.is_some();
        let mut media_pending = true;

        loop {
            tokio::select! {
                maybe_signal = recv_signal(&mut signal_rx), if signaling_open => {
                    match maybe_signal {
                        Some(SignalingEvent::Signal(signal)) => self.handle_signal(signal).await,
                        Some(SignalingEvent::Closed) | None => {
                            signaling_open = false;
                            tracing::warn!("Signaling transport closed");
                            self.set_status(ConnectionStatus::Disconnected);
                        }
                    }
                }
                maybe_command = commands.recv() => {
                    match maybe_command {
                        Some(Command::Leave) | None => {
                            self.teardown().await;
                            return;
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(signal) = outbox.recv() => self.emit(signal),
                Some(event) = link_events.recv() => self.handle_link_event(event).await,
                maybe_media = media_rx.recv(), if media_pending => {
                    media_pending = false;
                    if let Some((media, result)) = maybe_media {
                        self.finish_media_acquisition(media, result);
                    }
                }
            }
        }
    }

    async fn handle_signal(&mut self, signal: ServerSignal) {
        match signal {
            ServerSignal::UserJoined { participant_id } => {
                if participant_id == self.config.participant_id {
                    return;
                }
                self.add_participant(&participant_id);
                let tracks = self.local_tracks();
                if let Err(e) = self
                    .peers
                    .handle_participant_joined(&participant_id, &tracks)
                    .await
                {
                    self.fail_link(&participant_id, e).await;
                }
            }
            ServerSignal::Offer { from_id, offer } => {
                // An offer from an unseen id introduces that participant
                self.add_participant(&from_id);
                let tracks = self.local_tracks();
                if let Err(e) = self.peers.handle_offer(&from_id, offer, &tracks).await {
                    self.fail_link(&from_id, e).await;
                }
            }
            ServerSignal::Answer { from_id, answer } => {
                if let Err(e) = self.peers.handle_answer(&from_id, answer).await {
                    self.fail_link(&from_id, e).await;
                }
            }
            ServerSignal::IceCandidate { from_id, candidate } => {
                self.peers.handle_candidate(&from_id, candidate).await;
            }
            ServerSignal::UserLeft { participant_id } => {
                self.peers.discard(&participant_id).await;
                if self.roster.remove(&participant_id).is_some() {
                    self.send_event(RoomEvent::ParticipantLeft { participant_id });
                }
            }
            ServerSignal::ReceiveMessage { sender_id, text } => {
                if let Some(message) = self.chat.receive(sender_id, text) {
                    self.send_event(RoomEvent::Chat(message));
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendChat(text) => match self.chat.send(&text, self.state) {
                Ok((message, signal)) => {
                    self.emit(signal);
                    self.send_event(RoomEvent::Chat(message));
                }
                Err(e) => tracing::warn!(error = %e, "Chat message rejected"),
            },
            Command::ToggleCamera => match self.media.as_mut().map(|m| m.toggle_video()) {
                Some(Some(enabled)) => {
                    tracing::info!(enabled = enabled, "Toggled camera");
                }
                _ => tracing::warn!("No video track to toggle"),
            },
            Command::ToggleMic => match self.media.as_mut().map(|m| m.toggle_mic()) {
                Some(Some(enabled)) => {
                    tracing::info!(enabled = enabled, "Toggled microphone");
                }
                _ => tracing::warn!("No audio track to toggle"),
            },
            Command::Leave => unreachable!("Leave is handled by the session loop"),
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::RemoteTrack {
                participant_id,
                track,
            } => {
                let Some(participant) = self.roster.get_mut(&participant_id) else {
                    // link torn down while the track was in flight
                    return;
                };
                let stream_id = track.stream_id();
                if participant.stream_id.is_none() {
                    participant.stream_id = Some(stream_id.clone());
                }
                self.send_event(RoomEvent::TrackAdded {
                    participant_id,
                    stream_id,
                    kind: track.kind(),
                    track,
                });
            }
            LinkEvent::StateChanged {
                participant_id,
                state,
            } => {
                if state == RTCPeerConnectionState::Failed {
                    // Discard the failed link; other links are unaffected
                    self.peers.discard(&participant_id).await;
                    if let Some(participant) = self.roster.get_mut(&participant_id) {
                        participant.stream_id = None;
                    }
                }
                self.send_event(RoomEvent::LinkStatus {
                    participant_id,
                    state,
                });
            }
        }
    }

    /// Unconditional, best-effort teardown: every step runs even when a
    /// previous one failed.
    async fn teardown(&mut self) {
        self.set_state(SessionState::Leaving);

        self.peers.close_all().await;

        if let Some(signaling) = &self.signaling {
            signaling.emit(ClientSignal::LeaveRoom {
                meeting_id: self.config.meeting_id.clone(),
            });
            signaling.disconnect();
        }

        if let Some(media) = &mut self.media {
            media.release();
        }

        self.set_status(ConnectionStatus::Disconnected);
        self.set_state(SessionState::Closed);
        tracing::info!(meeting_id = %self.config.meeting_id, "Room session closed");
    }

    fn finish_media_acquisition(&mut self, media: LocalMediaController, result: Result<()>) {
        match result {
            Ok(()) => {
                self.send_event(RoomEvent::MediaReady {
                    video: media.video_enabled(),
                    audio: media.mic_enabled(),
                });
            }
            Err(e) => {
                // Receive-only join; the room proceeds regardless
                tracing::warn!(error = %e, "Local media unavailable, joining receive-only");
                self.send_event(RoomEvent::MediaFailed {
                    error: e.to_string(),
                });
            }
        }
        self.media = Some(media);
    }

    async fn fail_link(&mut self, participant_id: &str, error: MeetError) {
        tracing::error!(
            participant_id = %participant_id,
            error = %error,
            "Negotiation failed"
        );
        self.peers.discard(participant_id).await;
        self.send_event(RoomEvent::LinkStatus {
            participant_id: participant_id.to_string(),
            state: RTCPeerConnectionState::Failed,
        });
    }

    fn add_participant(&mut self, participant_id: &str) {
        if self.roster.contains_key(participant_id) {
            return;
        }
        self.roster.insert(
            participant_id.to_string(),
            Participant {
                id: participant_id.to_string(),
                role: None,
                stream_id: None,
            },
        );
        self.send_event(RoomEvent::ParticipantJoined {
            participant_id: participant_id.to_string(),
        });
    }

    fn local_tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        self.media
            .as_ref()
            .map(|media| media.tracks())
            .unwrap_or_default()
    }

    fn emit(&self, signal: ClientSignal) {
        if let Some(signaling) = &self.signaling {
            signaling.emit(signal);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Session state change");
            self.state = state;
            self.send_event(RoomEvent::StateChanged(state));
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.send_event(RoomEvent::StatusChanged(status));
        }
    }

    fn send_event(&self, event: RoomEvent) {
        // The receiver may be gone during unmount; nothing to do then
        let _ = self.events.send(event);
    }
}

async fn recv_signal(
    rx: &mut Option<mpsc::UnboundedReceiver<SignalingEvent>>,
) -> Option<SignalingEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
