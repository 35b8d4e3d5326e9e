use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{MeetError, Result};
use crate::room::rtc::{audio_capability, video_capability};

const VIDEO_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const AUDIO_FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// A stream of encoded frames for one outbound track
pub trait FrameFeed: Send + 'static {
    fn next_frame(&mut self) -> Bytes;
}

/// Frame feeds produced by an opened capture source
pub struct CaptureStreams {
    pub video: Option<Box<dyn FrameFeed>>,
    pub audio: Option<Box<dyn FrameFeed>>,
}

/// The seam where a camera/microphone backend plugs in. Opening may fail with
/// `MediaAccessDenied` or `MediaUnavailable`; the session treats either as a
/// degraded (receive-only) join rather than a fatal error.
pub trait CaptureSource: Send + 'static {
    fn open(&mut self) -> Result<CaptureStreams>;
}

/// Built-in capture source generating timed synthetic VP8/Opus payloads.
/// Stands in for real devices in the CLI and in tests.
pub struct SyntheticCapture {
    video: bool,
    audio: bool,
}

impl SyntheticCapture {
    pub fn new(video: bool, audio: bool) -> Self {
        Self { video, audio }
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new(true, true)
    }
}

struct SyntheticFeed {
    frame_size: usize,
    counter: u8,
}

impl FrameFeed for SyntheticFeed {
    fn next_frame(&mut self) -> Bytes {
        self.counter = self.counter.wrapping_add(1);
        Bytes::from(vec![self.counter; self.frame_size])
    }
}

impl CaptureSource for SyntheticCapture {
    fn open(&mut self) -> Result<CaptureStreams> {
        Ok(CaptureStreams {
            video: self.video.then(|| {
                Box::new(SyntheticFeed {
                    frame_size: 1200,
                    counter: 0,
                }) as Box<dyn FrameFeed>
            }),
            audio: self.audio.then(|| {
                Box::new(SyntheticFeed {
                    frame_size: 160,
                    counter: 0,
                }) as Box<dyn FrameFeed>
            }),
        })
    }
}

struct OutboundTrack {
    track: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

/// Owns the local camera/microphone tracks: at most one of each per session.
/// Only this controller starts or stops capture; peer links attach the tracks
/// read-only. Toggling flips an enabled flag in place, so the outbound track
/// count never changes and no renegotiation is triggered.
pub struct LocalMediaController {
    participant_id: String,
    video: Option<OutboundTrack>,
    audio: Option<OutboundTrack>,
}

impl LocalMediaController {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            video: None,
            audio: None,
        }
    }

    /// Open the capture source and start the outbound tracks. A second call
    /// while acquired is a no-op.
    pub fn acquire(&mut self, mut source: Box<dyn CaptureSource>) -> Result<()> {
        if self.video.is_some() || self.audio.is_some() {
            tracing::debug!(participant_id = %self.participant_id, "Media already acquired");
            return Ok(());
        }

        let streams = source.open()?;
        if streams.video.is_none() && streams.audio.is_none() {
            return Err(MeetError::MediaUnavailable(
                "capture source produced no tracks".to_string(),
            ));
        }

        if let Some(feed) = streams.video {
            self.video = Some(Self::start_track(
                video_capability(),
                format!("{}-video", self.participant_id),
                format!("{}-media", self.participant_id),
                feed,
                VIDEO_FRAME_INTERVAL,
            ));
        }

        if let Some(feed) = streams.audio {
            self.audio = Some(Self::start_track(
                audio_capability(),
                format!("{}-audio", self.participant_id),
                format!("{}-media", self.participant_id),
                feed,
                AUDIO_FRAME_INTERVAL,
            ));
        }

        tracing::info!(
            participant_id = %self.participant_id,
            has_video = self.video.is_some(),
            has_audio = self.audio.is_some(),
            "Local media acquired"
        );
        Ok(())
    }

    fn start_track(
        capability: webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability,
        track_id: String,
        stream_id: String,
        mut feed: Box<dyn FrameFeed>,
        interval: Duration,
    ) -> OutboundTrack {
        let track = Arc::new(TrackLocalStaticSample::new(capability, track_id, stream_id));
        let enabled = Arc::new(AtomicBool::new(true));

        let pump_track = track.clone();
        let pump_enabled = enabled.clone();
        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                // Muted: keep cadence, write nothing
                if !pump_enabled.load(Ordering::Relaxed) {
                    continue;
                }
                let sample = Sample {
                    data: feed.next_frame(),
                    duration: interval,
                    ..Default::default()
                };
                // Unbound tracks drop samples; not an error worth surfacing
                let _ = pump_track.write_sample(&sample).await;
            }
        });

        OutboundTrack {
            track,
            enabled,
            pump,
        }
    }

    /// Every outbound track, for attachment to a new peer link
    pub fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        let mut tracks: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if let Some(video) = &self.video {
            tracks.push(Arc::clone(&video.track) as Arc<dyn TrackLocal + Send + Sync>);
        }
        if let Some(audio) = &self.audio {
            tracks.push(Arc::clone(&audio.track) as Arc<dyn TrackLocal + Send + Sync>);
        }
        tracks
    }

    pub fn has_media(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }

    /// Flip the video enabled flag in place. Returns the new state, or None
    /// when no video track exists.
    pub fn toggle_video(&mut self) -> Option<bool> {
        Self::toggle(self.video.as_ref())
    }

    /// Flip the audio enabled flag in place. Returns the new state, or None
    /// when no audio track exists.
    pub fn toggle_mic(&mut self) -> Option<bool> {
        Self::toggle(self.audio.as_ref())
    }

    fn toggle(track: Option<&OutboundTrack>) -> Option<bool> {
        track.map(|t| {
            let now = !t.enabled.load(Ordering::Relaxed);
            t.enabled.store(now, Ordering::Relaxed);
            now
        })
    }

    pub fn video_enabled(&self) -> bool {
        self.video
            .as_ref()
            .map(|t| t.enabled.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn mic_enabled(&self) -> bool {
        self.audio
            .as_ref()
            .map(|t| t.enabled.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Stop every pump and drop the tracks. Idempotent: safe on an
    /// already-released or never-acquired controller.
    pub fn release(&mut self) {
        if let Some(video) = self.video.take() {
            video.pump.abort();
        }
        if let Some(audio) = self.audio.take() {
            audio.pump.abort();
        }
    }
}

impl Drop for LocalMediaController {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeniedCapture;

    impl CaptureSource for DeniedCapture {
        fn open(&mut self) -> Result<CaptureStreams> {
            Err(MeetError::MediaAccessDenied("permission refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_acquire_builds_one_track_per_kind() {
        let mut media = LocalMediaController::new("tutor-1");
        media.acquire(Box::new(SyntheticCapture::default())).unwrap();

        assert_eq!(media.tracks().len(), 2);
        assert!(media.video_enabled());
        assert!(media.mic_enabled());
    }

    #[tokio::test]
    async fn test_toggle_never_changes_track_count() {
        let mut media = LocalMediaController::new("tutor-1");
        media.acquire(Box::new(SyntheticCapture::default())).unwrap();

        let before = media.tracks().len();
        assert_eq!(media.toggle_video(), Some(false));
        assert_eq!(media.toggle_video(), Some(true));
        assert_eq!(media.toggle_video(), Some(false));
        assert_eq!(media.toggle_video(), Some(true));
        assert_eq!(media.tracks().len(), before);
        // two full off/on cycles restore the original flag
        assert!(media.video_enabled());
    }

    #[tokio::test]
    async fn test_audio_only_capture() {
        let mut media = LocalMediaController::new("student-2");
        media
            .acquire(Box::new(SyntheticCapture::new(false, true)))
            .unwrap();

        assert_eq!(media.tracks().len(), 1);
        assert_eq!(media.toggle_video(), None);
        assert_eq!(media.toggle_mic(), Some(false));
    }

    #[tokio::test]
    async fn test_denied_capture_maps_to_access_denied() {
        let mut media = LocalMediaController::new("student-2");
        let err = media.acquire(Box::new(DeniedCapture)).unwrap_err();
        assert!(matches!(err, MeetError::MediaAccessDenied(_)));
        assert!(!media.has_media());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let mut media = LocalMediaController::new("tutor-1");
        media.release(); // never acquired

        media.acquire(Box::new(SyntheticCapture::default())).unwrap();
        media.release();
        media.release();
        assert!(media.tracks().is_empty());
        assert!(!media.has_media());
    }
}
