//! Interfaces the session controller drives.
//!
//! The controller only knows these traits; [`crate::ros`] provides
//! rosbridge-backed implementations and tests substitute recording fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{MapRef, RecordingHandle};

/// Wireless scan recorder.
#[async_trait]
pub trait Scanner: Send + Sync {
	/// Starts recording against `map`, resolving once the recording runs.
	async fn start(&self, map: &MapRef) -> Result<RecordingHandle>;

	/// Stops the recording identified by `handle`.
	///
	/// A handle that is not the running recording is left alone and is not an
	/// error, so a late caller can never end a newer recording.
	async fn stop(&self, handle: &RecordingHandle) -> Result<()>;
}

/// Navigation stack of the robot.
#[async_trait]
pub trait NavigationClient: Send + Sync {
	/// Cancels every active navigation goal.
	async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait MapPersister: Send + Sync {
	async fn save(&self, map: &MapRef) -> Result<()>;
}

#[async_trait]
pub trait TrajectoryPersister: Send + Sync {
	async fn save(&self, handle: &RecordingHandle) -> Result<()>;
}

/// Everything a session controller is constructed with besides the bridge.
#[derive(Clone)]
pub struct Collaborators {
	pub scanner: Arc<dyn Scanner>,
	pub navigation: Arc<dyn NavigationClient>,
	pub map_persister: Arc<dyn MapPersister>,
	pub trajectory_persister: Arc<dyn TrajectoryPersister>,
}
