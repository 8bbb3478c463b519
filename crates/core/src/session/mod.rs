//! Session controller.
//!
//! A session runs in one of two modes from `start_*` to [`stop`]. The
//! controller composes the bridge (connectivity plus the collection
//! services) with the scanner, navigation client and persisters.
//!
//! # State
//!
//! `Idle` or `Running(mode, map, handle)`. The `Idle → Running` transition is a
//! check-and-set under a mutex that is never held across an await, so two
//! concurrent starts can never both proceed. Each session gets a generation
//! number; work finishing after its session was stopped compares generations
//! and leaves newer state alone.
//!
//! # Stop
//!
//! `stop()` reverts to `Idle` before any cleanup runs. Scanner stops are
//! scoped to the session's recording handle; when the scanner start is still
//! pending, the starting call stops its own recording once it resolves.
//! Exploration sessions then stop navigation, save the map and schedule the
//! trajectory save after the configured delay. The scheduled save is a
//! tracked task holding the session's own handle slot, bounded by
//! `recording_wait`, see [`SessionController::flush_persistence`].
//!
//! [`stop`]: SessionController::stop

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use survey_protocol::{Empty, StartCollectionRequest};
use survey_runtime::{CollectionServices, LinkProvider, TransportSupervisor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::error::SessionError;
use crate::model::{MapRef, RecordingHandle, SessionMode};

/// Default delay between an exploration stop and its trajectory save.
pub const DEFAULT_TRAJECTORY_SAVE_DELAY: Duration = Duration::from_millis(2000);

/// Default bound on how long a scheduled save waits for a pending scanner start.
pub const DEFAULT_RECORDING_WAIT: Duration = Duration::from_secs(10);

/// What the controller needs from the transport.
pub trait SessionBridge: Send + Sync {
	fn is_connected(&self) -> bool;

	/// Collection service proxies bound to the live link.
	fn collection_services(&self) -> Option<CollectionServices>;
}

impl SessionBridge for TransportSupervisor {
	fn is_connected(&self) -> bool {
		TransportSupervisor::is_connected(self) && self.link().is_some()
	}

	fn collection_services(&self) -> Option<CollectionServices> {
		self.services()
	}
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
	/// Request sent to the start-collection service in exploration mode.
	pub collection: StartCollectionRequest,
	pub trajectory_save_delay: Duration,
	/// Upper bound on waiting for the recording handle after the delay.
	pub recording_wait: Duration,
	/// Also call the end-collection service when an exploration stops.
	pub end_collection_on_stop: bool,
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			collection: StartCollectionRequest {
				name: "exploration".to_string(),
				topics: vec!["/scan".to_string(), "/odom".to_string()],
				store_rosbag: true,
			},
			trajectory_save_delay: DEFAULT_TRAJECTORY_SAVE_DELAY,
			recording_wait: DEFAULT_RECORDING_WAIT,
			end_collection_on_stop: false,
		}
	}
}

/// Read-only view of the session for status display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
	pub active: bool,
	pub mode: Option<SessionMode>,
	pub map: Option<MapRef>,
	/// Absent until the scanner start resolves.
	pub recording: Option<RecordingHandle>,
}

struct ActiveSession {
	generation: u64,
	mode: SessionMode,
	map: MapRef,
	handle: watch::Receiver<Option<RecordingHandle>>,
}

enum SessionState {
	Idle,
	Running(ActiveSession),
}

pub struct SessionController {
	bridge: Arc<dyn SessionBridge>,
	collaborators: Collaborators,
	settings: SessionSettings,
	state: Mutex<SessionState>,
	generation: AtomicU64,
	pending_saves: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionController {
	pub fn new(bridge: Arc<dyn SessionBridge>, collaborators: Collaborators, settings: SessionSettings) -> Self {
		Self {
			bridge,
			collaborators,
			settings,
			state: Mutex::new(SessionState::Idle),
			generation: AtomicU64::new(0),
			pending_saves: Mutex::new(Vec::new()),
		}
	}

	pub fn settings(&self) -> &SessionSettings {
		&self.settings
	}

	/// Starts an exploration session: the start-collection call and the
	/// scanner start run concurrently and both must succeed.
	pub async fn start_exploration(&self, map: MapRef) -> Result<(), SessionError> {
		self.start(SessionMode::Exploration, map).await
	}

	/// Starts a measurement session. No start-collection call is made.
	pub async fn start_measurement(&self, map: MapRef) -> Result<(), SessionError> {
		self.start(SessionMode::Measurement, map).await
	}

	async fn start(&self, mode: SessionMode, map: MapRef) -> Result<(), SessionError> {
		if !self.bridge.is_connected() {
			debug!(%mode, "start rejected: not connected");
			return Err(SessionError::NotConnected);
		}
		let services = match mode {
			SessionMode::Exploration => Some(self.bridge.collection_services().ok_or(SessionError::NotConnected)?),
			SessionMode::Measurement => None,
		};

		let (handle_tx, handle_rx) = watch::channel(None);
		let generation = {
			let mut state = self.state.lock();
			if let SessionState::Running(active) = &*state {
				debug!(%mode, running = %active.mode, "start rejected: session already active");
				return Err(SessionError::SessionAlreadyActive);
			}
			let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
			*state = SessionState::Running(ActiveSession {
				generation,
				mode,
				map: map.clone(),
				handle: handle_rx,
			});
			generation
		};
		info!(%mode, map_id = map.id, map = %map.name, generation, "session started");

		let scanner = &self.collaborators.scanner;
		let scan = async {
			let result = scanner.start(&map).await;
			if let Ok(handle) = &result {
				handle_tx.send_replace(Some(handle.clone()));
			}
			result
		};
		let collect = async {
			match &services {
				Some(services) => Some(services.start.call(&self.settings.collection).await),
				None => None,
			}
		};
		let (scanned, collected) = tokio::join!(scan, collect);

		let call_failure = match collected {
			None => None,
			Some(Ok(response)) if response.success => {
				debug!(message = %response.message, "start-collection accepted");
				None
			}
			Some(Ok(response)) => Some(SessionError::ServiceCallFailure {
				service: services.as_ref().map(|s| s.start.name().to_string()).unwrap_or_default(),
				message: response.message,
			}),
			Some(Err(e)) => Some(SessionError::Transport(e)),
		};

		match (scanned, call_failure) {
			(Err(e), call_failure) => {
				if let Some(call_failure) = call_failure {
					warn!(error = %call_failure, "start-collection also failed");
				}
				self.roll_back(generation);
				warn!(%mode, error = %e, "scanner failed to start");
				Err(SessionError::Scanner(e))
			}
			(Ok(handle), Some(failure)) => {
				self.roll_back(generation);
				warn!(%mode, error = %failure, recording = %handle, "start-collection failed, stopping scanner");
				if let Err(e) = scanner.stop(&handle).await {
					warn!(error = %e, "scanner stop after failed start");
				}
				Err(failure)
			}
			(Ok(handle), None) if !self.is_current(generation) => {
				warn!(%mode, recording = %handle, generation, "session stopped before the scanner started");
				if let Err(e) = scanner.stop(&handle).await {
					warn!(error = %e, "scanner stop after interrupted start");
				}
				Err(SessionError::Interrupted)
			}
			(Ok(handle), None) => {
				info!(%mode, recording = %handle, generation, "recording started");
				Ok(())
			}
		}
	}

	fn is_current(&self, generation: u64) -> bool {
		matches!(&*self.state.lock(), SessionState::Running(active) if active.generation == generation)
	}

	/// Reverts to `Idle` if the session of `generation` is still the current one.
	fn roll_back(&self, generation: u64) {
		let mut state = self.state.lock();
		if matches!(&*state, SessionState::Running(active) if active.generation == generation) {
			*state = SessionState::Idle;
		}
	}

	/// Ends the running session. A no-op when idle.
	///
	/// The session is closed before cleanup starts. Collaborator failures are
	/// logged and the remaining steps still run. The trajectory save of an
	/// exploration is scheduled and not awaited.
	pub async fn stop(&self) {
		let previous = {
			let mut state = self.state.lock();
			std::mem::replace(&mut *state, SessionState::Idle)
		};
		let SessionState::Running(session) = previous else {
			debug!("stop requested while idle");
			return;
		};
		info!(mode = %session.mode, map_id = session.map.id, generation = session.generation, "stopping session");

		let recording = session.handle.borrow().clone();
		match recording {
			Some(recording) => {
				if let Err(e) = self.collaborators.scanner.stop(&recording).await {
					warn!(%recording, error = %e, "scanner stop failed");
				}
			}
			None => debug!(generation = session.generation, "scanner start still pending, left to the starting call"),
		}

		if session.mode == SessionMode::Measurement {
			return;
		}

		if self.settings.end_collection_on_stop {
			self.end_collection().await;
		}
		if let Err(e) = self.collaborators.navigation.stop().await {
			warn!(error = %e, "navigation stop failed");
		}
		match self.collaborators.map_persister.save(&session.map).await {
			Ok(()) => info!(map_id = session.map.id, "map saved"),
			Err(e) => warn!(map_id = session.map.id, error = %e, "map save failed"),
		}
		self.schedule_trajectory_save(session);
	}

	async fn end_collection(&self) {
		let Some(services) = self.bridge.collection_services() else {
			warn!("cannot end collection: not connected");
			return;
		};
		match services.end.call(&Empty {}).await {
			Ok(response) if response.success => debug!("end-collection accepted"),
			Ok(response) => warn!(message = %response.message, "end-collection reported failure"),
			Err(e) => warn!(error = %e, "end-collection call failed"),
		}
	}

	fn schedule_trajectory_save(&self, session: ActiveSession) {
		let delay = self.settings.trajectory_save_delay;
		let recording_wait = self.settings.recording_wait;
		let persister = Arc::clone(&self.collaborators.trajectory_persister);
		let ActiveSession {
			generation,
			mut handle,
			..
		} = session;

		let task = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let recording = match tokio::time::timeout(recording_wait, handle.wait_for(Option::is_some)).await {
				Ok(Ok(value)) => value.clone(),
				_ => None,
			};
			let Some(recording) = recording else {
				warn!(generation, "scanner never produced a recording, skipping trajectory save");
				return;
			};
			match persister.save(&recording).await {
				Ok(()) => info!(%recording, "trajectory saved"),
				Err(e) => warn!(%recording, error = %e, "trajectory save failed"),
			}
		});

		let mut pending = self.pending_saves.lock();
		pending.retain(|task| !task.is_finished());
		pending.push(task);
	}

	/// Waits for every scheduled trajectory save to finish.
	pub async fn flush_persistence(&self) {
		let tasks = std::mem::take(&mut *self.pending_saves.lock());
		for task in tasks {
			if let Err(e) = task.await {
				if !e.is_cancelled() {
					warn!(error = %e, "trajectory save task failed");
				}
			}
		}
	}

	/// Aborts scheduled trajectory saves that have not run yet.
	pub fn cancel_persistence(&self) {
		for task in self.pending_saves.lock().drain(..) {
			task.abort();
		}
	}

	pub fn is_active(&self) -> bool {
		matches!(&*self.state.lock(), SessionState::Running(_))
	}

	pub fn status(&self) -> SessionStatus {
		match &*self.state.lock() {
			SessionState::Idle => SessionStatus {
				active: false,
				mode: None,
				map: None,
				recording: None,
			},
			SessionState::Running(active) => SessionStatus {
				active: true,
				mode: Some(active.mode),
				map: Some(active.map.clone()),
				recording: active.handle.borrow().clone(),
			},
		}
	}
}
