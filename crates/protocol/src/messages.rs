//! ROS message payloads as rosbridge encodes them.

use serde::{Deserialize, Serialize};

/// `std_msgs/Time` split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Time {
	pub secs: u32,
	pub nsecs: u32,
}

/// `std_msgs/Header`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
	pub seq: u32,
	pub stamp: Time,
	pub frame_id: String,
}

/// `geometry_msgs/Point`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

/// `geometry_msgs/Quaternion`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quaternion {
	pub x: f64,
	pub y: f64,
	pub z: f64,
	pub w: f64,
}

impl Default for Quaternion {
	fn default() -> Self {
		Self {
			x: 0.0,
			y: 0.0,
			z: 0.0,
			w: 1.0,
		}
	}
}

impl Quaternion {
	/// Heading around the z axis in radians.
	pub fn yaw(&self) -> f64 {
		let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
		let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
		siny_cosp.atan2(cosy_cosp)
	}
}

/// `geometry_msgs/Pose`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
	pub position: Point,
	pub orientation: Quaternion,
}

/// `geometry_msgs/PoseStamped`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseStamped {
	pub header: Header,
	pub pose: Pose,
}

/// `nav_msgs/Path`: the robot trajectory as an ordered list of poses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Path {
	pub header: Header,
	pub poses: Vec<PoseStamped>,
}

/// `nav_msgs/MapMetaData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMetaData {
	pub map_load_time: Time,
	/// Meters per cell.
	pub resolution: f32,
	pub width: u32,
	pub height: u32,
	/// Pose of cell (0, 0) in the map frame.
	pub origin: Pose,
}

/// `nav_msgs/OccupancyGrid`.
///
/// Cells are row-major starting at the origin; values are occupancy
/// probabilities in `[0, 100]` or `-1` for unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyGrid {
	pub header: Header,
	pub info: MapMetaData,
	pub data: Vec<i8>,
}

impl OccupancyGrid {
	/// Returns true when the grid carries one value per cell.
	pub fn is_consistent(&self) -> bool {
		self.data.len() == self.info.width as usize * self.info.height as usize
	}
}

/// `actionlib_msgs/GoalID`.
///
/// Publishing an empty id with a zero stamp on an action server's `cancel`
/// topic cancels every goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalId {
	pub stamp: Time,
	pub id: String,
}

impl GoalId {
	pub const TYPE: &'static str = "actionlib_msgs/GoalID";

	/// Goal id that matches every goal on the server.
	pub fn cancel_all() -> Self {
		Self::default()
	}
}
