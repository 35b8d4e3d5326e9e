mod chat;
mod peers;
pub mod rtc;
mod session;

pub use chat::{ChatChannel, ChatMessage};
pub use peers::{LinkEvent, LinkRole, PeerManager};
pub use session::{
    ConnectionStatus, Participant, RoomConfig, RoomEvent, RoomHandle, RoomSession, SessionState,
};
