//! Wire types for the rosbridge v2 protocol.
//!
//! This crate contains the serde-serializable shapes exchanged with a
//! rosbridge server over WebSocket text frames, plus the handful of ROS
//! message and service payloads the survey orchestrator needs.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **1:1 with the wire**: Field names match rosbridge and the ROS `.msg`/`.srv` definitions
//! - **Lenient on input**: Incoming payloads default missing fields instead of failing
//!
//! Connection handling and request correlation live in `survey-runtime`.

pub mod messages;
pub mod ops;
pub mod services;

pub use messages::*;
pub use ops::*;
pub use services::*;

/// Default port rosbridge_server listens on.
pub const ROSBRIDGE_PORT: u16 = 9090;
