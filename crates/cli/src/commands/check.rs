use std::time::Duration;

use survey::SurveyConfig;
use survey_runtime::TransportSupervisor;
use tracing::info;

use super::{print_json, spawn_status_logger};
use crate::error::{CliError, Result};

/// Connects once and prints the resulting connection status.
pub async fn run(config: SurveyConfig, timeout_secs: u64) -> Result<()> {
	let supervisor = TransportSupervisor::websocket(config.supervisor_config()?);
	let logger = spawn_status_logger(&supervisor);
	info!(url = %supervisor.url(), "checking rosbridge connection");
	supervisor.connect();

	let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), supervisor.wait_until_connected()).await;
	let status = supervisor.status();
	supervisor.shutdown();
	logger.abort();
	print_json(&status)?;

	match outcome {
		Ok(connected) => Ok(connected?),
		Err(_) => Err(CliError::Timeout {
			secs: timeout_secs,
			condition: format!("rosbridge at {}", supervisor.url()),
		}),
	}
}
