use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{MeetError, Result};
use crate::signal::ClientSignal;

/// Which side initiated negotiation for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Responder,
}

/// Negotiation progress of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    /// Local description set, remote side still outstanding
    Pending,
    /// Both descriptions applied
    Negotiated,
}

/// Events produced by a link's transport callbacks, drained by the session
/// loop so all map mutations stay on one task.
pub enum LinkEvent {
    RemoteTrack {
        participant_id: String,
        track: Arc<TrackRemote>,
    },
    StateChanged {
        participant_id: String,
        state: RTCPeerConnectionState,
    },
}

/// One media-transport connection to a remote participant
struct PeerLink {
    role: LinkRole,
    phase: LinkPhase,
    pc: Arc<RTCPeerConnection>,
    /// Remote candidates queued until the remote description is applied
    pending_candidates: Vec<RTCIceCandidateInit>,
}

/// Owns the full-mesh link table, keyed by participant id. At most one link
/// per id; every mutation happens on the session task, so guards are
/// existence checks rather than locks.
pub struct PeerManager {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    local_id: String,
    links: HashMap<String, PeerLink>,
    outbox: mpsc::UnboundedSender<ClientSignal>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl PeerManager {
    pub fn new(
        api: Arc<API>,
        ice_servers: Vec<RTCIceServer>,
        local_id: impl Into<String>,
        outbox: mpsc::UnboundedSender<ClientSignal>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            api,
            ice_servers,
            local_id: local_id.into(),
            links: HashMap::new(),
            outbox,
            events,
        }
    }

    /// A participant joined: create an initiator link and send exactly one
    /// offer. A second join notification for a known id is a no-op.
    pub async fn handle_participant_joined(
        &mut self,
        participant_id: &str,
        local_tracks: &[Arc<dyn TrackLocal + Send + Sync>],
    ) -> Result<()> {
        if self.links.contains_key(participant_id) {
            tracing::debug!(
                participant_id = %participant_id,
                "Duplicate join notification, link already exists"
            );
            return Ok(());
        }

        let link = self
            .build_link(participant_id, LinkRole::Initiator, local_tracks)
            .await?;

        let offer = match self.negotiate_offer(&link.pc).await {
            Ok(offer) => offer,
            Err(e) => {
                let _ = link.pc.close().await;
                return Err(MeetError::negotiation(participant_id, e.to_string()));
            }
        };

        self.links.insert(participant_id.to_string(), link);
        let _ = self.outbox.send(ClientSignal::Offer {
            target_id: participant_id.to_string(),
            offer,
        });
        tracing::info!(participant_id = %participant_id, "Sent offer to new participant");
        Ok(())
    }

    async fn negotiate_offer(&self, pc: &Arc<RTCPeerConnection>) -> Result<RTCSessionDescription> {
        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    /// An offer arrived. Unseen id: create a responder link and answer.
    /// Known id: ignore the duplicate, unless this is offer glare and the
    /// remote id orders before ours, in which case we yield the initiator
    /// role and answer instead.
    pub async fn handle_offer(
        &mut self,
        from_id: &str,
        offer: RTCSessionDescription,
        local_tracks: &[Arc<dyn TrackLocal + Send + Sync>],
    ) -> Result<()> {
        if let Some(existing) = self.links.get(from_id) {
            let glare = existing.role == LinkRole::Initiator && existing.phase == LinkPhase::Pending;
            if !(glare && from_id < self.local_id.as_str()) {
                tracing::debug!(
                    participant_id = %from_id,
                    "Ignoring offer for existing link"
                );
                return Ok(());
            }
            tracing::info!(
                participant_id = %from_id,
                "Offer glare, yielding initiator role to lower id"
            );
            self.discard(from_id).await;
        }

        let mut link = self
            .build_link(from_id, LinkRole::Responder, local_tracks)
            .await?;

        let answer = match self.negotiate_answer(&link.pc, offer).await {
            Ok(answer) => answer,
            Err(e) => {
                let _ = link.pc.close().await;
                return Err(MeetError::negotiation(from_id, e.to_string()));
            }
        };

        link.phase = LinkPhase::Negotiated;
        self.links.insert(from_id.to_string(), link);
        let _ = self.outbox.send(ClientSignal::Answer {
            target_id: from_id.to_string(),
            answer,
        });
        tracing::info!(participant_id = %from_id, "Answered offer");
        Ok(())
    }

    async fn negotiate_answer(
        &self,
        pc: &Arc<RTCPeerConnection>,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        pc.set_remote_description(offer).await?;
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// An answer arrived for an initiator link. Missing link (torn down
    /// meanwhile) is a logged no-op.
    pub async fn handle_answer(
        &mut self,
        from_id: &str,
        answer: RTCSessionDescription,
    ) -> Result<()> {
        let Some(link) = self.links.get_mut(from_id) else {
            tracing::warn!(participant_id = %from_id, "Answer for unknown link, ignoring");
            return Ok(());
        };

        link.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| MeetError::negotiation(from_id, e.to_string()))?;
        link.phase = LinkPhase::Negotiated;

        // Flush candidates queued while the remote description was missing
        let queued: Vec<RTCIceCandidateInit> = link.pending_candidates.drain(..).collect();
        for candidate in queued {
            if let Err(e) = link.pc.add_ice_candidate(candidate).await {
                tracing::warn!(
                    participant_id = %from_id,
                    error = %e,
                    "Failed to apply queued candidate"
                );
            }
        }
        Ok(())
    }

    /// Apply a remote candidate. Unknown link: no-op. A single bad candidate
    /// is logged and swallowed, never tearing down the link.
    pub async fn handle_candidate(&mut self, from_id: &str, candidate: RTCIceCandidateInit) {
        let Some(link) = self.links.get_mut(from_id) else {
            tracing::debug!(participant_id = %from_id, "Candidate for unknown link, ignoring");
            return;
        };

        if link.pc.remote_description().await.is_none() {
            link.pending_candidates.push(candidate);
            tracing::debug!(
                participant_id = %from_id,
                queued = link.pending_candidates.len(),
                "Queued candidate until remote description is set"
            );
            return;
        }

        if let Err(e) = link.pc.add_ice_candidate(candidate).await {
            tracing::warn!(participant_id = %from_id, error = %e, "Failed to apply candidate");
        }
    }

    /// Close and drop the link for a participant. Best-effort; safe when no
    /// link exists.
    pub async fn discard(&mut self, participant_id: &str) {
        if let Some(link) = self.links.remove(participant_id) {
            if let Err(e) = link.pc.close().await {
                tracing::debug!(
                    participant_id = %participant_id,
                    error = %e,
                    "Error closing link"
                );
            }
            tracing::info!(participant_id = %participant_id, "Closed peer link");
        }
    }

    /// Unconditional teardown of every link
    pub async fn close_all(&mut self) {
        for (participant_id, link) in self.links.drain() {
            if let Err(e) = link.pc.close().await {
                tracing::debug!(
                    participant_id = %participant_id,
                    error = %e,
                    "Error closing link during teardown"
                );
            }
        }
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.links.contains_key(participant_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn role_of(&self, participant_id: &str) -> Option<LinkRole> {
        self.links.get(participant_id).map(|link| link.role)
    }

    async fn build_link(
        &self,
        participant_id: &str,
        role: LinkRole,
        local_tracks: &[Arc<dyn TrackLocal + Send + Sync>],
    ) -> Result<PeerLink> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(|e| MeetError::PeerConnectionCreation(e.to_string()))?,
        );

        // Attach (read-only) every local track; the media controller keeps
        // ownership and is the only place tracks start or stop.
        for track in local_tracks {
            if let Err(e) = pc.add_track(track.clone()).await {
                let _ = pc.close().await;
                return Err(MeetError::negotiation(participant_id, e.to_string()));
            }
        }

        // Locally gathered candidates go to this participant only
        let outbox = self.outbox.clone();
        let target_id = participant_id.to_string();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let outbox = outbox.clone();
            let target_id = target_id.clone();
            Box::pin(async move {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = outbox.send(ClientSignal::IceCandidate {
                                target_id,
                                candidate: init,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to marshal local candidate");
                        }
                    }
                }
            })
        }));

        let events = self.events.clone();
        let id = participant_id.to_string();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let _ = events.send(LinkEvent::RemoteTrack {
                participant_id: id.clone(),
                track,
            });
            Box::pin(async move {})
        }));

        let events = self.events.clone();
        let id = participant_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let _ = events.send(LinkEvent::StateChanged {
                participant_id: id.clone(),
                state,
            });
            Box::pin(async move {})
        }));

        tracing::debug!(
            participant_id = %participant_id,
            ?role,
            tracks = local_tracks.len(),
            "Built peer link"
        );

        Ok(PeerLink {
            role,
            phase: LinkPhase::Pending,
            pc,
            pending_candidates: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::rtc::build_api;
    use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

    fn manager(
        local_id: &str,
    ) -> (
        PeerManager,
        mpsc::UnboundedReceiver<ClientSignal>,
        mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        let api = build_api().unwrap();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            PeerManager::new(api, vec![], local_id, outbox_tx, event_tx),
            outbox_rx,
            event_rx,
        )
    }

    /// A valid offer from a throwaway peer connection
    async fn make_offer() -> RTCSessionDescription {
        let api = build_api().unwrap();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();
        let offer = pc.create_offer(None).await.unwrap();
        pc.set_local_description(offer.clone()).await.unwrap();
        offer
    }

    fn drain_signals(rx: &mut mpsc::UnboundedReceiver<ClientSignal>) -> Vec<ClientSignal> {
        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        signals
    }

    #[tokio::test]
    async fn test_duplicate_join_creates_single_link_and_offer() {
        let (mut peers, mut outbox, _events) = manager("tutor-1");

        peers.handle_participant_joined("student-2", &[]).await.unwrap();
        peers.handle_participant_joined("student-2", &[]).await.unwrap();

        assert_eq!(peers.len(), 1);
        let offers = drain_signals(&mut outbox)
            .into_iter()
            .filter(|s| matches!(s, ClientSignal::Offer { .. }))
            .count();
        assert_eq!(offers, 1);
    }

    #[tokio::test]
    async fn test_offer_for_existing_link_is_ignored() {
        // local id orders before the remote one, so no glare yield
        let (mut peers, mut outbox, _events) = manager("a-tutor");

        peers.handle_participant_joined("b-student", &[]).await.unwrap();
        drain_signals(&mut outbox);

        let offer = make_offer().await;
        peers.handle_offer("b-student", offer, &[]).await.unwrap();

        assert_eq!(peers.len(), 1);
        assert_eq!(peers.role_of("b-student"), Some(LinkRole::Initiator));
        assert!(drain_signals(&mut outbox)
            .iter()
            .all(|s| !matches!(s, ClientSignal::Answer { .. })));
    }

    #[tokio::test]
    async fn test_glare_yields_to_lower_id() {
        // remote "a-tutor" orders before local "b-student": we must yield
        let (mut peers, mut outbox, _events) = manager("b-student");

        peers.handle_participant_joined("a-tutor", &[]).await.unwrap();
        assert_eq!(peers.role_of("a-tutor"), Some(LinkRole::Initiator));

        let offer = make_offer().await;
        peers.handle_offer("a-tutor", offer, &[]).await.unwrap();

        assert_eq!(peers.len(), 1);
        assert_eq!(peers.role_of("a-tutor"), Some(LinkRole::Responder));
        let answers = drain_signals(&mut outbox)
            .into_iter()
            .filter(|s| matches!(s, ClientSignal::Answer { .. }))
            .count();
        assert_eq!(answers, 1);
    }

    #[tokio::test]
    async fn test_unseen_offer_creates_responder_link() {
        let (mut peers, mut outbox, _events) = manager("tutor-1");

        let offer = make_offer().await;
        peers.handle_offer("student-2", offer, &[]).await.unwrap();

        assert_eq!(peers.role_of("student-2"), Some(LinkRole::Responder));
        let answers = drain_signals(&mut outbox)
            .into_iter()
            .filter(|s| matches!(s, ClientSignal::Answer { .. }))
            .count();
        assert_eq!(answers, 1);
    }

    #[tokio::test]
    async fn test_answer_without_link_is_noop() {
        let (mut peers, _outbox, _events) = manager("tutor-1");
        let answer = make_offer().await;
        assert!(peers.handle_answer("ghost", answer).await.is_ok());
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_without_link_is_noop() {
        let (mut peers, _outbox, _events) = manager("tutor-1");
        peers
            .handle_candidate(
                "ghost",
                RTCIceCandidateInit {
                    candidate: "candidate:1 1 udp 2130706431 127.0.0.1 4444 typ host".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_queued_until_remote_description() {
        let (mut peers, _outbox, _events) = manager("tutor-1");
        peers.handle_participant_joined("student-2", &[]).await.unwrap();

        // initiator link has no remote description yet; must queue, not fail
        peers
            .handle_candidate(
                "student-2",
                RTCIceCandidateInit {
                    candidate: "candidate:1 1 udp 2130706431 127.0.0.1 4444 typ host".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(peers.contains("student-2"));
    }

    #[tokio::test]
    async fn test_participant_left_removes_link() {
        let (mut peers, _outbox, _events) = manager("tutor-1");
        peers.handle_participant_joined("student-2", &[]).await.unwrap();
        assert!(peers.contains("student-2"));

        peers.discard("student-2").await;
        assert!(!peers.contains("student-2"));

        // discarding again is safe
        peers.discard("student-2").await;
    }
}
