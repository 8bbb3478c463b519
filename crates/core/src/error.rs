//! Error types for survey sessions and collaborators.

use thiserror::Error;

/// Result type alias for collaborator and configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by collaborators, artifacts and configuration.
#[derive(Debug, Error)]
pub enum Error {
	/// Failure on the rosbridge link.
	#[error(transparent)]
	Runtime(#[from] survey_runtime::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Configuration file could not be used.
	#[error("configuration error: {0}")]
	Config(String),

	/// A collaborator reported a failure of its own.
	#[error("{name}: {message}")]
	Collaborator { name: &'static str, message: String },
}

/// Caller-visible failures of session start operations.
#[derive(Debug, Error)]
pub enum SessionError {
	/// Start attempted while the transport is down.
	#[error("not connected to the robot")]
	NotConnected,

	/// Start attempted while another session is running.
	#[error("a session is already active")]
	SessionAlreadyActive,

	/// The start-collection service answered `success: false`.
	#[error("service {service} reported failure: {message}")]
	ServiceCallFailure { service: String, message: String },

	/// The start-collection call never got an answer.
	#[error("start-collection call failed: {0}")]
	Transport(#[from] survey_runtime::Error),

	#[error("scanner failed to start: {0}")]
	Scanner(#[source] Error),

	/// `stop()` ran before the scanner start resolved.
	#[error("session was stopped before the scanner started")]
	Interrupted,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_runtime_errors_are_transparent() {
		let err: Error = survey_runtime::Error::NotConnected.into();
		assert_eq!(err.to_string(), "Not connected to rosbridge");
	}

	#[test]
	fn test_service_failure_message() {
		let err = SessionError::ServiceCallFailure {
			service: "/data_collector/start".into(),
			message: "already recording".into(),
		};
		assert_eq!(
			err.to_string(),
			"service /data_collector/start reported failure: already recording"
		);
	}
}
