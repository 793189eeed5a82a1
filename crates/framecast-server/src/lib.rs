#![forbid(unsafe_code)]

mod config;
mod metrics;
mod publish;
mod queue;
mod registry;
mod server;
mod session;
mod timeouts;
pub mod source;

pub use config::StreamConfig;
pub use publish::{BroadcastReport, FramePublisher};
pub use server::{start_server, ServerHandle};

/// The single supported WebSocket subprotocol. Clients that do not offer it
/// are refused at the handshake.
pub const STREAM_SUBPROTOCOL: &str = "rust-websocket";
