//! Error types for the survey runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the rosbridge server.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the WebSocket connection.
	#[error("Failed to connect to rosbridge: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (WebSocket read/write).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed or unexpected rosbridge frame.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The bridge could not execute a service call (`result: false`).
	#[error("Service {service} failed: {message}")]
	ServiceFailed {
		/// Service name as called.
		service: String,
		/// Message reported by the bridge.
		message: String,
	},

	/// No live link to the bridge.
	#[error("Not connected to rosbridge")]
	NotConnected,

	/// Connection closed while a request was outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// The configured bridge or master URI cannot be used.
	#[error("Invalid URL: {0}")]
	InvalidUrl(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true when the error means the link went away rather than the
	/// remote side rejecting the request.
	pub fn is_disconnect(&self) -> bool {
		matches!(
			self,
			Error::NotConnected | Error::ChannelClosed | Error::TransportError(_) | Error::ConnectionFailed(_)
		)
	}
}
