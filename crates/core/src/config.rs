//! Survey configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config. The
//! bridge host comes from `bridge.master_uri` or, when unset, from the
//! `ROS_MASTER_URI` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use survey_protocol::{GetMap, GetRobotTrajectory, ROSBRIDGE_PORT, ServiceDefinition, StartCollectionRequest};
use survey_runtime::{CollectionServiceNames, SupervisorConfig};

use crate::artifacts::ArtifactStore;
use crate::error::{Error, Result};
use crate::session::SessionSettings;

/// Environment variable consulted when no master URI is configured.
pub const MASTER_URI_ENV: &str = "ROS_MASTER_URI";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
	pub bridge: BridgeConfig,
	pub collection: CollectionConfig,
	pub session: SessionConfig,
	pub robot: RobotConfig,
	/// Root of recordings, maps and trajectories.
	pub artifacts_dir: PathBuf,
}

impl Default for SurveyConfig {
	fn default() -> Self {
		Self {
			bridge: BridgeConfig::default(),
			collection: CollectionConfig::default(),
			session: SessionConfig::default(),
			robot: RobotConfig::default(),
			artifacts_dir: PathBuf::from("survey-data"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
	/// URI of the ROS master, e.g. `http://robot:11311`. Only its host is used.
	pub master_uri: Option<String>,
	pub port: u16,
	pub reconnect_interval_ms: u64,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			master_uri: None,
			port: ROSBRIDGE_PORT,
			reconnect_interval_ms: 5000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
	pub services: CollectionServiceNames,
	pub session_name: String,
	pub topics: Vec<String>,
	pub store_rosbag: bool,
	pub end_collection_on_stop: bool,
}

impl Default for CollectionConfig {
	fn default() -> Self {
		Self {
			services: CollectionServiceNames::default(),
			session_name: "exploration".to_string(),
			topics: vec!["/scan".to_string(), "/odom".to_string()],
			store_rosbag: true,
			end_collection_on_stop: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	pub trajectory_save_delay_ms: u64,
	/// How long a scheduled trajectory save waits for a pending scanner start.
	pub recording_wait_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			trajectory_save_delay_ms: 2000,
			recording_wait_ms: 10_000,
		}
	}
}

/// Topic and service names on the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
	pub move_base_cancel_topic: String,
	pub map_service: String,
	pub map_service_type: String,
	pub trajectory_service: String,
	pub trajectory_service_type: String,
	pub wifi_topic: String,
	/// Empty lets the bridge infer the type.
	pub wifi_topic_type: String,
	/// Retry period for resubscribing the wifi topic after the link drops.
	pub wifi_resubscribe_interval_ms: u64,
}

impl Default for RobotConfig {
	fn default() -> Self {
		Self {
			move_base_cancel_topic: "/move_base/cancel".to_string(),
			map_service: "/dynamic_map".to_string(),
			map_service_type: GetMap::DEFAULT_TYPE.to_string(),
			trajectory_service: "/trajectory".to_string(),
			trajectory_service_type: GetRobotTrajectory::DEFAULT_TYPE.to_string(),
			wifi_topic: "/wifi_scan".to_string(),
			wifi_topic_type: String::new(),
			wifi_resubscribe_interval_ms: 1000,
		}
	}
}

impl SurveyConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let contents = std::fs::read_to_string(path)
			.map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
		serde_json::from_str(&contents).map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))
	}

	/// Configured master URI, else the `ROS_MASTER_URI` environment variable.
	pub fn master_uri(&self) -> Result<String> {
		resolve_master_uri(self.bridge.master_uri.as_deref(), std::env::var(MASTER_URI_ENV).ok())
	}

	pub fn bridge_url(&self) -> Result<String> {
		Ok(survey_runtime::bridge_url(&self.master_uri()?, self.bridge.port)?)
	}

	pub fn supervisor_config(&self) -> Result<SupervisorConfig> {
		Ok(SupervisorConfig {
			url: self.bridge_url()?,
			reconnect_interval: Duration::from_millis(self.bridge.reconnect_interval_ms),
			services: self.collection.services.clone(),
		})
	}

	pub fn session_settings(&self) -> SessionSettings {
		SessionSettings {
			collection: StartCollectionRequest {
				name: self.collection.session_name.clone(),
				topics: self.collection.topics.clone(),
				store_rosbag: self.collection.store_rosbag,
			},
			trajectory_save_delay: Duration::from_millis(self.session.trajectory_save_delay_ms),
			recording_wait: Duration::from_millis(self.session.recording_wait_ms),
			end_collection_on_stop: self.collection.end_collection_on_stop,
		}
	}

	pub fn artifact_store(&self) -> ArtifactStore {
		ArtifactStore::new(&self.artifacts_dir)
	}
}

fn resolve_master_uri(configured: Option<&str>, env: Option<String>) -> Result<String> {
	configured
		.map(str::to_string)
		.or(env)
		.filter(|uri| !uri.trim().is_empty())
		.ok_or_else(|| Error::Config(format!("no bridge.master_uri configured and {MASTER_URI_ENV} is unset")))
}
