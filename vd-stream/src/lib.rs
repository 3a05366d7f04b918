//! Vidarr Stream - WebSocket client for real-time server events.
//!
//! This crate provides the event stream layer that handles:
//! - The single long-lived WebSocket connection to the Vidarr server
//! - Automatic reconnection with deterministic exponential backoff
//! - Decoding of the server's `{"type", "payload"}` frame format
//! - A subscription registry with filter predicates and removal by
//!   callback identity
//! - Synchronous, ordered dispatch with per-subscriber panic isolation

pub mod backoff;
pub mod dispatcher;
pub mod manager;
pub mod message;
pub mod registry;
pub mod transport;

// Re-export key types
pub use backoff::BackoffPolicy;
pub use dispatcher::Dispatcher;
pub use manager::{ConnectionState, StreamManager};
pub use message::{
    DownloadCompletePayload, StreamEventType, StreamMessage, VideoSummary,
};
pub use registry::{MessageCallback, MessageFilter, Subscription, SubscriptionRegistry};
pub use transport::{Connector, Transport, WsConnector};
