use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use survey::{MapRef, SessionController, SessionMode, SessionStatus, SurveyConfig, ros};
use survey_runtime::{ConnectionStatus, TransportSupervisor};
use tracing::info;

use super::{print_json, spawn_status_logger};
use crate::cli::SessionArgs;
use crate::error::{CliError, Result};

#[derive(Debug, Serialize)]
struct SessionReport<'a> {
	event: &'a str,
	session: SessionStatus,
	connection: ConnectionStatus,
}

/// Runs one session from connect to the delayed trajectory save.
pub async fn run(config: SurveyConfig, mode: SessionMode, args: SessionArgs) -> Result<()> {
	let map = MapRef::from_file(&args.map).with_context(|| format!("reading map {}", args.map.display()))?;

	let supervisor = TransportSupervisor::websocket(config.supervisor_config()?);
	let logger = spawn_status_logger(&supervisor);
	info!(url = %supervisor.url(), "connecting to rosbridge");
	supervisor.connect();

	let connected = tokio::time::timeout(
		Duration::from_secs(args.connect_timeout),
		supervisor.wait_until_connected(),
	)
	.await;
	match connected {
		Ok(result) => result?,
		Err(_) => {
			supervisor.shutdown();
			return Err(CliError::Timeout {
				secs: args.connect_timeout,
				condition: format!("rosbridge at {}", supervisor.url()),
			});
		}
	}

	let store = config.artifact_store();
	let collaborators = ros::collaborators(Arc::new(supervisor.clone()), &config);
	let controller = SessionController::new(Arc::new(supervisor.clone()), collaborators, config.session_settings());

	let started = match mode {
		SessionMode::Exploration => controller.start_exploration(map).await,
		SessionMode::Measurement => controller.start_measurement(map).await,
	};
	if let Err(e) = started {
		supervisor.shutdown();
		return Err(e.into());
	}
	report(&controller, &supervisor, "started")?;

	tokio::select! {
		signal = tokio::signal::ctrl_c() => {
			signal?;
			info!("interrupted, stopping session");
		}
		_ = elapsed(args.duration) => info!("duration elapsed, stopping session"),
	}

	controller.stop().await;
	info!(
		delay_ms = controller.settings().trajectory_save_delay.as_millis() as u64,
		"waiting for scheduled saves"
	);
	controller.flush_persistence().await;
	report(&controller, &supervisor, "stopped")?;

	supervisor.shutdown();
	logger.abort();
	info!(artifacts = %store.root().display(), "session finished");
	Ok(())
}

async fn elapsed(duration: Option<u64>) {
	match duration {
		Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
		None => std::future::pending().await,
	}
}

fn report(controller: &SessionController, supervisor: &TransportSupervisor, event: &str) -> Result<()> {
	print_json(&SessionReport {
		event,
		session: controller.status(),
		connection: supervisor.status(),
	})
}
