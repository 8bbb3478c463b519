//! Map and trajectory persisters.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use survey_protocol::{Empty, GetMap, GetRobotTrajectory, OccupancyGrid, PoseStamped};
use survey_runtime::{LinkProvider, ServiceProxy};
use tracing::{info, warn};

use super::live_link;
use crate::artifacts::{ArtifactStore, unix_millis};
use crate::collaborators::{MapPersister, TrajectoryPersister};
use crate::error::Result;
use crate::model::{MapRef, RecordingHandle};

/// Contents of `maps/<map-id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMap {
	pub map: MapRef,
	pub saved_at_ms: u64,
	pub grid: OccupancyGrid,
}

/// Contents of `trajectories/<handle>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTrajectory {
	pub recording: RecordingHandle,
	pub saved_at_ms: u64,
	pub frame_id: String,
	pub poses: Vec<PoseStamped>,
}

/// Fetches the occupancy grid from the mapper and stores it with its [`MapRef`].
pub struct MapSaver {
	links: Arc<dyn LinkProvider>,
	store: ArtifactStore,
	service: String,
	service_type: String,
}

impl MapSaver {
	pub fn new(links: Arc<dyn LinkProvider>, store: ArtifactStore, service: &str, service_type: &str) -> Self {
		Self {
			links,
			store,
			service: service.to_string(),
			service_type: service_type.to_string(),
		}
	}
}

#[async_trait]
impl MapPersister for MapSaver {
	async fn save(&self, map: &MapRef) -> Result<()> {
		let proxy = ServiceProxy::<GetMap>::new(live_link(self.links.as_ref())?, &self.service, &self.service_type);
		let grid = proxy.call(&Empty {}).await?.map;
		if !grid.is_consistent() {
			warn!(
				map_id = map.id,
				cells = grid.data.len(),
				width = grid.info.width,
				height = grid.info.height,
				"occupancy grid size does not match its metadata"
			);
		}

		let saved = SavedMap {
			map: map.clone(),
			saved_at_ms: unix_millis(),
			grid,
		};
		let path = self.store.write_json("maps", &format!("{}.json", map.id), &saved).await?;
		info!(map_id = map.id, path = %path.display(), "map stored");
		Ok(())
	}
}

/// Fetches the driven path and stores it under the recording's handle.
pub struct TrajectorySaver {
	links: Arc<dyn LinkProvider>,
	store: ArtifactStore,
	service: String,
	service_type: String,
}

impl TrajectorySaver {
	pub fn new(links: Arc<dyn LinkProvider>, store: ArtifactStore, service: &str, service_type: &str) -> Self {
		Self {
			links,
			store,
			service: service.to_string(),
			service_type: service_type.to_string(),
		}
	}
}

#[async_trait]
impl TrajectoryPersister for TrajectorySaver {
	async fn save(&self, handle: &RecordingHandle) -> Result<()> {
		let proxy = ServiceProxy::<GetRobotTrajectory>::new(
			live_link(self.links.as_ref())?,
			&self.service,
			&self.service_type,
		);
		let trajectory = proxy.call(&Empty {}).await?.trajectory;

		let saved = SavedTrajectory {
			recording: handle.clone(),
			saved_at_ms: unix_millis(),
			frame_id: trajectory.header.frame_id,
			poses: trajectory.poses,
		};
		let path = self
			.store
			.write_json("trajectories", &format!("{handle}.json"), &saved)
			.await?;
		info!(recording = %handle, poses = saved.poses.len(), path = %path.display(), "trajectory stored");
		Ok(())
	}
}
