mod client;
mod message;

pub use client::{SignalingClient, SignalingEvent};
pub use message::{ClientSignal, ParticipantRole, ServerSignal};
