use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice::network_type::NetworkType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;

use crate::config::IceConfig;
use crate::error::{MeetError, Result};

pub const VIDEO_MIME_TYPE: &str = "video/VP8";
pub const AUDIO_MIME_TYPE: &str = "audio/opus";

/// Codec capability for outbound video tracks
pub fn video_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: VIDEO_MIME_TYPE.to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: "".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Codec capability for outbound audio tracks
pub fn audio_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: AUDIO_MIME_TYPE.to_string(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Builds the shared WebRTC API: VP8 + Opus, default interceptors, IPv4 only.
/// Every peer link in a session is created from the same API instance.
pub fn build_api() -> Result<Arc<API>> {
    let mut media_engine = MediaEngine::default();

    // RTCP feedback for keyframe recovery on video
    let video_rtcp_feedback = vec![
        RTCPFeedback {
            typ: "nack".to_string(),
            parameter: "".to_string(),
        },
        RTCPFeedback {
            typ: "nack".to_string(),
            parameter: "pli".to_string(),
        },
    ];

    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    rtcp_feedback: video_rtcp_feedback,
                    ..video_capability()
                },
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )
        .map_err(|e| MeetError::WebRtcApi(format!("Failed to register VP8 codec: {}", e)))?;

    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: audio_capability(),
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )
        .map_err(|e| MeetError::WebRtcApi(format!("Failed to register Opus codec: {}", e)))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| MeetError::WebRtcApi(format!("Failed to register interceptors: {}", e)))?;

    // IPv4 only, mDNS off: avoids IPv6 binding errors and mDNS noise
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_network_types(vec![NetworkType::Udp4, NetworkType::Tcp4]);
    setting_engine.set_ice_multicast_dns_mode(webrtc::ice::mdns::MulticastDnsMode::Disabled);

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .with_setting_engine(setting_engine)
        .build();

    Ok(Arc::new(api))
}

/// ICE server list from configuration
pub fn ice_servers_from(config: &IceConfig) -> Vec<RTCIceServer> {
    let mut ice_servers = Vec::new();

    for stun_server in &config.stun_servers {
        ice_servers.push(RTCIceServer {
            urls: vec![stun_server.clone()],
            ..Default::default()
        });
    }

    for turn_server in &config.turn_servers {
        ice_servers.push(RTCIceServer {
            urls: turn_server.urls.clone(),
            username: turn_server.username.clone(),
            credential: turn_server.credential.clone(),
            credential_type:
                webrtc::ice_transport::ice_credential_type::RTCIceCredentialType::Password,
        });
    }

    ice_servers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnServer;

    #[test]
    fn test_ice_servers_include_turn_credentials() {
        let config = IceConfig {
            stun_servers: vec!["stun:stun.example.org:3478".to_string()],
            turn_servers: vec![TurnServer {
                urls: vec!["turn:turn.example.org:3478".to_string()],
                username: "user".to_string(),
                credential: "secret".to_string(),
            }],
        };

        let servers = ice_servers_from(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls[0], "stun:stun.example.org:3478");
        assert_eq!(servers[1].username, "user");
    }

    #[test]
    fn test_build_api() {
        assert!(build_api().is_ok());
    }
}
