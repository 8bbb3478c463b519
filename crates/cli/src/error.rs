use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("cannot load config {path}")]
	Config {
		path: PathBuf,
		#[source]
		source: survey::Error,
	},

	#[error("timeout after {secs}s waiting for: {condition}")]
	Timeout { secs: u64, condition: String },

	#[error(transparent)]
	Session(#[from] survey::SessionError),

	#[error(transparent)]
	Survey(#[from] survey::Error),

	#[error(transparent)]
	Runtime(#[from] survey_runtime::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Process exit code: 2 for configuration problems, 3 when the robot was
	/// unreachable in time, 4 when a session was refused, 1 otherwise.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::Config { .. } | CliError::Survey(survey::Error::Config(_)) => 2,
			CliError::Timeout { .. } => 3,
			CliError::Session(_) => 4,
			_ => 1,
		}
	}
}
