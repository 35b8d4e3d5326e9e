use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Role a participant registers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Tutor,
    Student,
}

/// Signals a client sends to the relay.
///
/// Tag names and payload keys are the wire contract with the relay service;
/// descriptions and candidates ride as opaque blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSignal {
    RegisterUser {
        #[serde(rename = "participantId")]
        participant_id: String,
        role: ParticipantRole,
    },

    JoinRoom {
        #[serde(rename = "meetingId")]
        meeting_id: String,
    },

    LeaveRoom {
        #[serde(rename = "meetingId")]
        meeting_id: String,
    },

    Offer {
        #[serde(rename = "targetId")]
        target_id: String,
        offer: RTCSessionDescription,
    },

    Answer {
        #[serde(rename = "targetId")]
        target_id: String,
        answer: RTCSessionDescription,
    },

    IceCandidate {
        #[serde(rename = "targetId")]
        target_id: String,
        candidate: RTCIceCandidateInit,
    },

    SendMessage {
        #[serde(rename = "meetingId")]
        meeting_id: String,
        #[serde(rename = "senderId")]
        sender_id: String,
        text: String,
    },
}

/// Signals the relay delivers to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerSignal {
    UserJoined {
        #[serde(rename = "participantId")]
        participant_id: String,
    },

    UserLeft {
        #[serde(rename = "participantId")]
        participant_id: String,
    },

    Offer {
        #[serde(rename = "fromId")]
        from_id: String,
        offer: RTCSessionDescription,
    },

    Answer {
        #[serde(rename = "fromId")]
        from_id: String,
        answer: RTCSessionDescription,
    },

    IceCandidate {
        #[serde(rename = "fromId")]
        from_id: String,
        candidate: RTCIceCandidateInit,
    },

    ReceiveMessage {
        #[serde(rename = "senderId")]
        sender_id: String,
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_user_wire_shape() {
        let signal = ClientSignal::RegisterUser {
            participant_id: "tutor-1".to_string(),
            role: ParticipantRole::Tutor,
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&signal).unwrap()).unwrap();
        assert_eq!(json["type"], "register_user");
        assert_eq!(json["participantId"], "tutor-1");
        assert_eq!(json["role"], "tutor");
    }

    #[test]
    fn test_ice_candidate_wire_shape() {
        let signal = ClientSignal::IceCandidate {
            target_id: "student-9".to_string(),
            candidate: RTCIceCandidateInit {
                candidate: "candidate:1 1 udp 2130706431 127.0.0.1 4444 typ host".to_string(),
                ..Default::default()
            },
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&signal).unwrap()).unwrap();
        assert_eq!(json["type"], "ice_candidate");
        assert_eq!(json["targetId"], "student-9");
        assert!(json["candidate"]["candidate"]
            .as_str()
            .unwrap()
            .starts_with("candidate:"));
    }

    #[test]
    fn test_user_joined_parses() {
        let signal: ServerSignal =
            serde_json::from_str(r#"{"type":"user_joined","participantId":"student-3"}"#).unwrap();
        assert!(
            matches!(signal, ServerSignal::UserJoined { participant_id } if participant_id == "student-3")
        );
    }

    #[test]
    fn test_receive_message_parses() {
        let signal: ServerSignal = serde_json::from_str(
            r#"{"type":"receive_message","senderId":"tutor-1","text":"hello"}"#,
        )
        .unwrap();
        match signal {
            ServerSignal::ReceiveMessage { sender_id, text } => {
                assert_eq!(sender_id, "tutor-1");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }
}
