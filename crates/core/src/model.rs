//! Session data model: maps, recording handles and session modes.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pose of the map's lower-left cell in the map frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOrigin {
	pub x: f64,
	pub y: f64,
	pub yaw: f64,
}

/// Identifier and metadata of the map a session collects against.
///
/// Owned by the caller; the controller keeps a copy for the session's
/// duration and hands it to the scanner and map persister.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapRef {
	pub id: u64,
	pub name: String,
	pub building: Option<String>,
	pub floor: Option<i32>,
	/// Meters per cell.
	pub resolution: f64,
	pub width: u32,
	pub height: u32,
	pub origin: MapOrigin,
}

impl MapRef {
	pub fn new(id: u64, name: impl Into<String>) -> Self {
		Self {
			id,
			name: name.into(),
			..Self::default()
		}
	}

	/// Reads a map reference from a JSON file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let contents = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&contents)?)
	}
}

/// Opaque token naming one recording produced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingHandle(String);

impl RecordingHandle {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RecordingHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
	/// Robot explores autonomously while the map is built and recorded.
	Exploration,
	/// Scanning on an existing map, no data collection on the robot.
	Measurement,
}

impl fmt::Display for SessionMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionMode::Exploration => f.write_str("exploration"),
			SessionMode::Measurement => f.write_str("measurement"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_map_ref_fills_missing_fields() {
		let map: MapRef = serde_json::from_str(r#"{"id": 7, "name": "floor-2", "resolution": 0.05}"#).unwrap();
		assert_eq!(map.id, 7);
		assert_eq!(map.name, "floor-2");
		assert_eq!(map.building, None);
		assert_eq!(map.origin, MapOrigin::default());
	}

	#[test]
	fn test_map_ref_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("map.json");
		std::fs::write(&path, r#"{"id": 3, "name": "lab", "building": "B1", "width": 320}"#).unwrap();

		let map = MapRef::from_file(&path).unwrap();
		assert_eq!(map.building.as_deref(), Some("B1"));
		assert_eq!(map.width, 320);
	}

	#[test]
	fn test_recording_handle_is_a_plain_string() {
		let handle = RecordingHandle::new("3-1700000000000");
		assert_eq!(serde_json::to_value(&handle).unwrap(), "3-1700000000000");
		assert_eq!(handle.to_string(), "3-1700000000000");
	}

	#[test]
	fn test_session_mode_names() {
		assert_eq!(SessionMode::Exploration.to_string(), "exploration");
		assert_eq!(serde_json::to_value(SessionMode::Measurement).unwrap(), "measurement");
	}
}
