//! ROS service request/response pairs.
//!
//! Each service is a zero-sized marker implementing [`ServiceDefinition`];
//! the runtime's typed proxy uses it to serialize requests and decode
//! responses without knowing anything about the service itself.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::messages::{OccupancyGrid, Path};

/// Shape of a ROS service.
pub trait ServiceDefinition {
	/// Type string used when the caller does not configure one.
	const DEFAULT_TYPE: &'static str;
	type Request: Serialize + Send + Sync;
	type Response: DeserializeOwned + Send;
}

/// Starts a data collection run on the robot (records a rosbag of `topics`).
#[derive(Debug, Clone, Copy)]
pub struct StartCollection;

impl ServiceDefinition for StartCollection {
	const DEFAULT_TYPE: &'static str = "robotslam_data_collection/Start";
	type Request = StartCollectionRequest;
	type Response = StartCollectionResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCollectionRequest {
	/// Label of the run, e.g. `"exploration"`.
	pub name: String,
	/// Topics recorded for the duration of the run.
	pub topics: Vec<String>,
	/// Whether the robot keeps a rosbag of the recorded topics.
	pub store_rosbag: bool,
}

/// Application-level outcome of a start-collection call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartCollectionResponse {
	pub success: bool,
	pub message: String,
}

/// `std_srvs/Trigger`.
#[derive(Debug, Clone, Copy)]
pub struct Trigger;

impl ServiceDefinition for Trigger {
	const DEFAULT_TYPE: &'static str = "std_srvs/Trigger";
	type Request = Empty;
	type Response = TriggerResponse;
}

/// Request with no fields; serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerResponse {
	pub success: bool,
	pub message: String,
}

/// `nav_msgs/GetMap`: the current occupancy grid from the mapper.
#[derive(Debug, Clone, Copy)]
pub struct GetMap;

impl ServiceDefinition for GetMap {
	const DEFAULT_TYPE: &'static str = "nav_msgs/GetMap";
	type Request = Empty;
	type Response = GetMapResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetMapResponse {
	pub map: OccupancyGrid,
}

/// `hector_nav_msgs/GetRobotTrajectory`: the path driven since startup.
#[derive(Debug, Clone, Copy)]
pub struct GetRobotTrajectory;

impl ServiceDefinition for GetRobotTrajectory {
	const DEFAULT_TYPE: &'static str = "hector_nav_msgs/GetRobotTrajectory";
	type Request = Empty;
	type Response = GetRobotTrajectoryResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetRobotTrajectoryResponse {
	pub trajectory: Path,
}
