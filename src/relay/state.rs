use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use crate::signal::ParticipantRole;

/// A registered participant on the relay
pub struct RelayPeer {
    pub id: String,
    pub role: ParticipantRole,
    pub sender: mpsc::UnboundedSender<Message>,
}

/// Registered participants and room membership. The relay is a message bus:
/// it holds no transcript, no media, nothing beyond who is where.
pub struct RelayState {
    peers: Arc<RwLock<HashMap<String, RelayPeer>>>,
    rooms: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl RelayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Bind a connection to a participant id. A second registration for a
    /// live id is refused.
    pub async fn register_participant(
        &self,
        participant_id: String,
        role: ParticipantRole,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<(), String> {
        let mut peers = self.peers.write().await;

        if peers.contains_key(&participant_id) {
            return Err(format!("Participant {} already registered", participant_id));
        }

        peers.insert(
            participant_id.clone(),
            RelayPeer {
                id: participant_id.clone(),
                role,
                sender,
            },
        );

        tracing::info!(participant_id = %participant_id, "Participant registered");
        Ok(())
    }

    /// Add a participant to a room; returns the senders of the members that
    /// were already there (the ones to notify). Joining twice is harmless.
    pub async fn join_room(
        &self,
        meeting_id: &str,
        participant_id: &str,
    ) -> Vec<mpsc::UnboundedSender<Message>> {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(meeting_id.to_string()).or_default();

        let others: Vec<String> = members
            .iter()
            .filter(|id| id.as_str() != participant_id)
            .cloned()
            .collect();
        members.insert(participant_id.to_string());
        drop(rooms);

        tracing::info!(
            participant_id = %participant_id,
            meeting_id = %meeting_id,
            "Participant joined room"
        );
        self.senders_of(&others).await
    }

    /// Remove a participant from a room; returns the senders of the
    /// remaining members.
    pub async fn leave_room(
        &self,
        meeting_id: &str,
        participant_id: &str,
    ) -> Vec<mpsc::UnboundedSender<Message>> {
        let mut rooms = self.rooms.write().await;

        let remaining: Vec<String> = match rooms.get_mut(meeting_id) {
            Some(members) => {
                members.remove(participant_id);
                if members.is_empty() {
                    rooms.remove(meeting_id);
                    Vec::new()
                } else {
                    members.iter().cloned().collect()
                }
            }
            None => Vec::new(),
        };
        drop(rooms);

        tracing::info!(
            participant_id = %participant_id,
            meeting_id = %meeting_id,
            "Participant left room"
        );
        self.senders_of(&remaining).await
    }

    /// Drop a participant entirely (transport closed). Returns, per room the
    /// participant was in, the senders of the remaining members.
    pub async fn remove_participant(
        &self,
        participant_id: &str,
    ) -> Vec<(String, Vec<mpsc::UnboundedSender<Message>>)> {
        let joined_rooms: Vec<String> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(_, members)| members.contains(participant_id))
                .map(|(meeting_id, _)| meeting_id.clone())
                .collect()
        };

        let mut notifications = Vec::new();
        for meeting_id in joined_rooms {
            let remaining = self.leave_room(&meeting_id, participant_id).await;
            notifications.push((meeting_id, remaining));
        }

        let mut peers = self.peers.write().await;
        peers.remove(participant_id);
        tracing::info!(participant_id = %participant_id, "Participant removed");

        notifications
    }

    /// Sender for a targeted forward
    pub async fn sender_of(
        &self,
        participant_id: &str,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let peers = self.peers.read().await;
        peers.get(participant_id).map(|peer| peer.sender.clone())
    }

    /// Senders of every member of a room, including the sender of a chat
    /// broadcast (clients dedup their own echo)
    pub async fn room_senders(&self, meeting_id: &str) -> Vec<mpsc::UnboundedSender<Message>> {
        let members: Vec<String> = {
            let rooms = self.rooms.read().await;
            rooms
                .get(meeting_id)
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default()
        };
        self.senders_of(&members).await
    }

    pub async fn room_size(&self, meeting_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(meeting_id).map(|members| members.len()).unwrap_or(0)
    }

    pub async fn participant_count(&self) -> usize {
        let peers = self.peers.read().await;
        peers.len()
    }

    async fn senders_of(&self, ids: &[String]) -> Vec<mpsc::UnboundedSender<Message>> {
        let peers = self.peers.read().await;
        ids.iter()
            .filter_map(|id| peers.get(id).map(|peer| peer.sender.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<Message> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn test_register_refuses_duplicate_id() {
        let state = RelayState::new();
        state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await
            .unwrap();

        let result = state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await;
        assert!(result.is_err());
        assert_eq!(state.participant_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_room_reports_existing_members() {
        let state = RelayState::new();
        state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await
            .unwrap();
        state
            .register_participant("student-2".to_string(), ParticipantRole::Student, sender())
            .await
            .unwrap();

        let others = state.join_room("meeting-42", "tutor-1").await;
        assert!(others.is_empty());

        let others = state.join_room("meeting-42", "student-2").await;
        assert_eq!(others.len(), 1);
        assert_eq!(state.room_size("meeting-42").await, 2);
    }

    #[tokio::test]
    async fn test_rejoining_is_harmless() {
        let state = RelayState::new();
        state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await
            .unwrap();

        state.join_room("meeting-42", "tutor-1").await;
        state.join_room("meeting-42", "tutor-1").await;
        assert_eq!(state.room_size("meeting-42").await, 1);
    }

    #[tokio::test]
    async fn test_remove_participant_cleans_rooms() {
        let state = RelayState::new();
        state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await
            .unwrap();
        state
            .register_participant("student-2".to_string(), ParticipantRole::Student, sender())
            .await
            .unwrap();
        state.join_room("meeting-42", "tutor-1").await;
        state.join_room("meeting-42", "student-2").await;

        let notifications = state.remove_participant("student-2").await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "meeting-42");
        assert_eq!(notifications[0].1.len(), 1);

        assert_eq!(state.room_size("meeting-42").await, 1);
        assert_eq!(state.participant_count().await, 1);
        assert!(state.sender_of("student-2").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_room_is_dropped() {
        let state = RelayState::new();
        state
            .register_participant("tutor-1".to_string(), ParticipantRole::Tutor, sender())
            .await
            .unwrap();
        state.join_room("meeting-42", "tutor-1").await;
        state.leave_room("meeting-42", "tutor-1").await;
        assert_eq!(state.room_size("meeting-42").await, 0);
    }
}
