use crate::error::{MeetError, Result};
use crate::signal::ClientSignal;

use super::session::SessionState;

/// One entry of the room transcript. `seq` is the local append order; the
/// transcript is never persisted beyond the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: String,
    pub text: String,
    pub seq: u64,
}

/// Append-only chat transcript scoped to one room session.
///
/// Sends append optimistically; the relay echoes `receive_message` to the
/// whole room, so incoming messages from the local participant id are
/// dropped instead of appended twice. Identity is the stable participant id,
/// never a transport connection id.
pub struct ChatChannel {
    meeting_id: String,
    local_id: String,
    transcript: Vec<ChatMessage>,
    next_seq: u64,
}

impl ChatChannel {
    pub fn new(meeting_id: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            local_id: local_id.into(),
            transcript: Vec::new(),
            next_seq: 0,
        }
    }

    /// Validate and send. Blank text and any session state other than
    /// `Active` are rejected. On success the message is already in the
    /// transcript and the returned signal must be emitted to the relay.
    pub fn send(&mut self, text: &str, state: SessionState) -> Result<(ChatMessage, ClientSignal)> {
        if text.trim().is_empty() {
            return Err(MeetError::EmptyChatMessage);
        }
        if state != SessionState::Active {
            return Err(MeetError::ChatUnavailable(state.to_string()));
        }

        let message = self.append(self.local_id.clone(), text.to_string());
        let signal = ClientSignal::SendMessage {
            meeting_id: self.meeting_id.clone(),
            sender_id: self.local_id.clone(),
            text: text.to_string(),
        };
        Ok((message, signal))
    }

    /// Append an incoming message, unless it is the relay's echo of our own
    /// optimistic append.
    pub fn receive(&mut self, sender_id: String, text: String) -> Option<ChatMessage> {
        if sender_id == self.local_id {
            tracing::debug!("Dropping echoed own chat message");
            return None;
        }
        Some(self.append(sender_id, text))
    }

    fn append(&mut self, sender_id: String, text: String) -> ChatMessage {
        let message = ChatMessage {
            sender_id,
            text,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.transcript.push(message.clone());
        message
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChatChannel {
        ChatChannel::new("meeting-42", "tutor-1")
    }

    #[test]
    fn test_blank_text_rejected() {
        let mut chat = channel();
        assert!(matches!(
            chat.send("   \t", SessionState::Active),
            Err(MeetError::EmptyChatMessage)
        ));
        assert!(chat.transcript().is_empty());
    }

    #[test]
    fn test_send_requires_active_session() {
        let mut chat = channel();
        assert!(matches!(
            chat.send("hello", SessionState::Joining),
            Err(MeetError::ChatUnavailable(_))
        ));
        assert!(matches!(
            chat.send("hello", SessionState::Leaving),
            Err(MeetError::ChatUnavailable(_))
        ));
    }

    #[test]
    fn test_send_appends_optimistically() {
        let mut chat = channel();
        let (message, signal) = chat.send("hello", SessionState::Active).unwrap();
        assert_eq!(message.sender_id, "tutor-1");
        assert_eq!(chat.transcript().len(), 1);

        match signal {
            ClientSignal::SendMessage {
                meeting_id,
                sender_id,
                text,
            } => {
                assert_eq!(meeting_id, "meeting-42");
                assert_eq!(sender_id, "tutor-1");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[test]
    fn test_own_echo_never_duplicated() {
        let mut chat = channel();
        chat.send("hello", SessionState::Active).unwrap();

        // the relay broadcasts to the whole room, sender included
        assert!(chat.receive("tutor-1".to_string(), "hello".to_string()).is_none());
        assert_eq!(chat.transcript().len(), 1);
    }

    #[test]
    fn test_transcript_keeps_append_order() {
        let mut chat = channel();
        chat.send("first", SessionState::Active).unwrap();
        chat.receive("student-2".to_string(), "second".to_string());
        chat.send("third", SessionState::Active).unwrap();

        let seqs: Vec<u64> = chat.transcript().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(chat.transcript()[1].sender_id, "student-2");
    }
}
