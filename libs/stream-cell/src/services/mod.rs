pub mod client;
pub mod hub;
pub mod reconnect;
pub mod transport;

pub use client::{StreamCallbacks, StreamClient};
pub use hub::{ObserverStream, StreamHub};
pub use reconnect::{backoff_delay, Command, Input, ReconnectMachine, TimerId, TimerPurpose};
pub use transport::{FrameStream, SseParser, SseTransport, StreamTransport};
