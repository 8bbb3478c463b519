mod check;
mod session;
mod show_config;

use std::path::{Path, PathBuf};

use serde::Serialize;
use survey::{SessionMode, SurveyConfig};
use survey_runtime::TransportSupervisor;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = load_config(cli.config.as_deref(), cli.master_uri, default_config_path())?;

	match cli.command {
		Commands::Explore(args) => session::run(config, SessionMode::Exploration, args).await,
		Commands::Measure(args) => session::run(config, SessionMode::Measurement, args).await,
		Commands::Check { timeout } => check::run(config, timeout).await,
		Commands::Config => show_config::run(&config),
	}
}

fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("survey").join("config.json"))
}

/// Explicit `--config`, else the default path when it exists, else defaults.
fn load_config(explicit: Option<&Path>, master_uri: Option<String>, fallback: Option<PathBuf>) -> Result<SurveyConfig> {
	let path = match explicit {
		Some(path) => Some(path.to_path_buf()),
		None => fallback.filter(|path| path.is_file()),
	};

	let mut config = match path {
		Some(path) => {
			debug!(path = %path.display(), "loading config");
			SurveyConfig::load(&path).map_err(|source| CliError::Config { path, source })?
		}
		None => SurveyConfig::default(),
	};

	if master_uri.is_some() {
		config.bridge.master_uri = master_uri;
	}
	Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Logs every connection state change until the supervisor goes away.
fn spawn_status_logger(supervisor: &TransportSupervisor) -> tokio::task::JoinHandle<()> {
	let mut status = supervisor.subscribe_status();
	tokio::spawn(async move {
		while status.changed().await.is_ok() {
			let current = status.borrow_and_update().clone();
			match current.last_error {
				Some(error) if !current.is_connected() => warn!(
					state = ?current.state,
					failures = current.consecutive_failures,
					%error,
					"rosbridge link down"
				),
				_ => info!(state = ?current.state, "rosbridge link state"),
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_default_config_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let fallback = dir.path().join("survey").join("config.json");

		let config = load_config(None, None, Some(fallback)).unwrap();
		assert_eq!(config, SurveyConfig::default());
	}

	#[test]
	fn master_uri_flag_overrides_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"bridge": {"master_uri": "http://file:11311", "port": 9191}}"#).unwrap();

		let config = load_config(Some(&path), Some("http://flag:11311".into()), None).unwrap();
		assert_eq!(config.bridge.master_uri.as_deref(), Some("http://flag:11311"));
		assert_eq!(config.bridge.port, 9191);
	}

	#[test]
	fn default_path_is_used_when_present() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"session": {"trajectory_save_delay_ms": 500}}"#).unwrap();

		let config = load_config(None, None, Some(path)).unwrap();
		assert_eq!(config.session.trajectory_save_delay_ms, 500);
	}

	#[test]
	fn explicit_missing_config_is_an_error() {
		let err = load_config(Some(Path::new("/nonexistent/survey.json")), None, None).unwrap_err();
		assert!(matches!(err, CliError::Config { .. }));
		assert_eq!(err.exit_code(), 2);
	}
}
