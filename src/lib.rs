//! Real-time meeting-room core of the e-tutoring platform: signaling client,
//! room session, peer connection mesh, local media and in-room chat, plus a
//! development signaling relay. The presentation layer consumes the
//! [`room::RoomEvent`] stream; everything else stays inside the session.

pub mod config;
pub mod error;
pub mod media;
pub mod relay;
pub mod room;
pub mod signal;

pub use config::Config;
pub use error::{MeetError, Result};
pub use room::{RoomConfig, RoomEvent, RoomHandle, RoomSession};
