//! Collaborators backed by the robot's rosbridge link.
//!
//! Each adapter asks its [`LinkProvider`] for the live link on every
//! operation, so they keep working across reconnects and fail with
//! `NotConnected` while the link is down. A running wifi recording
//! resubscribes on the next link when its subscription ends.

mod navigation;
mod persist;
mod scanner;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use survey_runtime::{LinkProvider, RosLink};

use crate::collaborators::Collaborators;
use crate::config::SurveyConfig;
use crate::error::Result;

pub use navigation::MoveBaseClient;
pub use persist::{MapSaver, SavedMap, SavedTrajectory, TrajectorySaver};
pub use scanner::{WifiSample, WifiScanner};

/// Builds the full rosbridge-backed collaborator set from configuration.
pub fn collaborators(links: Arc<dyn LinkProvider>, config: &SurveyConfig) -> Collaborators {
	let store = config.artifact_store();
	let robot = &config.robot;
	Collaborators {
		scanner: Arc::new(
			WifiScanner::new(Arc::clone(&links), store.clone(), &robot.wifi_topic, &robot.wifi_topic_type)
				.with_resubscribe_interval(Duration::from_millis(robot.wifi_resubscribe_interval_ms)),
		),
		navigation: Arc::new(MoveBaseClient::new(Arc::clone(&links), &robot.move_base_cancel_topic)),
		map_persister: Arc::new(MapSaver::new(
			Arc::clone(&links),
			store.clone(),
			&robot.map_service,
			&robot.map_service_type,
		)),
		trajectory_persister: Arc::new(TrajectorySaver::new(
			links,
			store,
			&robot.trajectory_service,
			&robot.trajectory_service_type,
		)),
	}
}

fn live_link(links: &dyn LinkProvider) -> Result<Arc<dyn RosLink>> {
	Ok(links.link().ok_or(survey_runtime::Error::NotConnected)?)
}
