use thiserror::Error;

/// Error taxonomy for the meeting-room core
#[derive(Debug, Error)]
pub enum MeetError {
    /// Signaling transport errors
    #[error("Signaling relay unavailable: {0}")]
    SignalingUnavailable(String),

    #[error("Signaling transport closed")]
    SignalingClosed,

    #[error("Invalid signal message: {0}")]
    InvalidSignal(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Local media errors
    #[error("Media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// Per-participant negotiation errors
    #[error("Negotiation failed with {participant_id}: {reason}")]
    NegotiationFailed {
        participant_id: String,
        reason: String,
    },

    #[error("Failed to create peer connection: {0}")]
    PeerConnectionCreation(String),

    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    /// Room session errors
    #[error("Meeting id must not be empty")]
    EmptyMeetingId,

    #[error("Chat message must not be blank")]
    EmptyChatMessage,

    #[error("Chat requires an active session (state is {0})")]
    ChatUnavailable(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebRTC API errors
    #[error("WebRTC API error: {0}")]
    WebRtcApi(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type alias for Results using MeetError
pub type Result<T> = std::result::Result<T, MeetError>;

impl MeetError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        MeetError::Internal(msg.into())
    }

    /// Helper to create signaling-unavailable errors
    pub fn signaling(msg: impl Into<String>) -> Self {
        MeetError::SignalingUnavailable(msg.into())
    }

    /// Helper to create per-participant negotiation errors
    pub fn negotiation(participant_id: impl Into<String>, reason: impl Into<String>) -> Self {
        MeetError::NegotiationFailed {
            participant_id: participant_id.into(),
            reason: reason.into(),
        }
    }
}

/// Convert webrtc::Error to MeetError
impl From<webrtc::Error> for MeetError {
    fn from(err: webrtc::Error) -> Self {
        MeetError::WebRtcApi(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeetError::negotiation("tutor-1", "remote description rejected");
        assert_eq!(
            err.to_string(),
            "Negotiation failed with tutor-1: remote description rejected"
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = MeetError::signaling("connection refused");
        assert!(matches!(err, MeetError::SignalingUnavailable(_)));
    }
}
