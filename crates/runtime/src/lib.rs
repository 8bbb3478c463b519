//! Survey Runtime - rosbridge transport, connection, and supervision
//!
//! This crate provides the low-level runtime infrastructure for talking to a
//! robot's ROS middleware through a rosbridge WebSocket server:
//!
//! - **Transport**: Bidirectional JSON frames over WebSocket
//! - **Connection**: Service call correlation, topic fan-out, advertisement tracking
//! - **Service proxies**: Typed request/response wrappers bound to a live link
//! - **Supervisor**: Connection state machine with fixed-interval reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ survey-core  │  Session controller, collaborators
//! └──────┬───────┘
//!        │ LinkProvider / CollectionServices
//! ┌──────▼───────┐
//! │survey-runtime│  This crate
//! │  ┌────────┐  │
//! │  │ Super  │  │  Reconnect + health status
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Conn   │  │  call_service correlation, pub/sub
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket transport
//! │  └────────┘  │
//! └──────────────┘
//! ```
//!
//! # Decoupling via RosLink
//!
//! Consumers only see the object-safe [`RosLink`] trait, so proxies and
//! collaborators can be exercised against in-memory fakes.

pub mod connection;
pub mod error;
pub mod link;
pub mod service;
pub mod supervisor;
pub mod transport;

// Re-export key types at crate root
pub use connection::Connection;
pub use error::{Error, Result};
pub use link::{LinkFuture, LinkProvider, RosLink};
pub use service::{CollectionServiceNames, CollectionServices, ServiceProxy};
pub use supervisor::{
	ConnectionStatus, Connector, Established, LinkState, SupervisorConfig, TransportEvent, TransportSupervisor,
	WebSocketConnector, bridge_url,
};
pub use transport::{
	Transport, TransportParts, TransportReceiver, WebSocketTransport, WebSocketTransportReceiver,
	WebSocketTransportSender,
};
