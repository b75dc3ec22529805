mod channel;
mod wire;

pub use channel::MessageChannel;
pub use wire::{Command, SessionStatus, StartResponse, StateResponse, StopResponse};
