use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize};

use async_trait::async_trait;
use serde_json::{Value, json};
use survey_runtime::{CollectionServiceNames, LinkFuture, RosLink};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::*;
use crate::collaborators::{MapPersister, NavigationClient, Scanner, TrajectoryPersister};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Call {
	Service(String, Value),
	ScannerStart(u64),
	ScannerStop(String),
	NavigationStop,
	MapSave(u64),
	TrajectorySave(String),
}

/// Shared, timestamped record of every collaborator call.
#[derive(Default)]
struct Journal {
	calls: Mutex<Vec<(Call, Instant)>>,
}

impl Journal {
	fn record(&self, call: Call) {
		self.calls.lock().push((call, Instant::now()));
	}

	fn calls(&self) -> Vec<Call> {
		self.calls.lock().iter().map(|(call, _)| call.clone()).collect()
	}

	fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
		self.calls.lock().iter().filter(|(call, _)| matches(call)).count()
	}

	fn time_of(&self, matches: impl Fn(&Call) -> bool) -> Option<Instant> {
		self.calls.lock().iter().find(|(call, _)| matches(call)).map(|(_, at)| *at)
	}
}

/// Link answering service calls from a queue, success by default.
struct ScriptedLink {
	journal: Arc<Journal>,
	responses: Mutex<VecDeque<survey_runtime::Result<Value>>>,
}

impl RosLink for ScriptedLink {
	fn call_service(&self, service: &str, _service_type: &str, args: Value) -> LinkFuture<'_, Value> {
		self.journal.record(Call::Service(service.to_string(), args));
		let response = self
			.responses
			.lock()
			.pop_front()
			.unwrap_or_else(|| Ok(json!({"success": true, "message": ""})));
		Box::pin(async move { response })
	}

	fn publish(&self, _topic: &str, _message_type: &str, _message: Value) -> LinkFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn subscribe(&self, _topic: &str, _message_type: &str) -> LinkFuture<'_, mpsc::UnboundedReceiver<Value>> {
		Box::pin(async { Err(survey_runtime::Error::NotConnected) })
	}

	fn unsubscribe(&self, _topic: &str) -> LinkFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn close(&self) {}
}

struct FakeBridge {
	connected: AtomicBool,
	link: Arc<ScriptedLink>,
}

impl SessionBridge for FakeBridge {
	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	fn collection_services(&self) -> Option<CollectionServices> {
		self.is_connected()
			.then(|| CollectionServices::bind(self.link.clone(), &CollectionServiceNames::default()))
	}
}

#[derive(Default)]
struct FakeScanner {
	journal: Arc<Journal>,
	started: AtomicUsize,
	fail: AtomicBool,
	/// Holds the next start until the sender fires.
	gate: Mutex<Option<oneshot::Receiver<()>>>,
	/// Running recording and the start that installed it. A start that
	/// resolves after a newer one does not replace it.
	current: Mutex<Option<(usize, RecordingHandle)>>,
}

impl FakeScanner {
	fn recording(&self) -> Option<RecordingHandle> {
		self.current.lock().as_ref().map(|(_, handle)| handle.clone())
	}
}

#[async_trait]
impl Scanner for FakeScanner {
	async fn start(&self, map: &MapRef) -> Result<RecordingHandle> {
		self.journal.record(Call::ScannerStart(map.id));
		let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
		let gate = self.gate.lock().take();
		if let Some(gate) = gate {
			let _ = gate.await;
		}
		if self.fail.load(Ordering::SeqCst) {
			return Err(Error::Collaborator {
				name: "scanner",
				message: "radio busy".into(),
			});
		}
		let handle = RecordingHandle::new(format!("rec-{n}"));
		let mut current = self.current.lock();
		if current.as_ref().is_none_or(|(installed, _)| *installed < n) {
			*current = Some((n, handle.clone()));
		}
		Ok(handle)
	}

	async fn stop(&self, handle: &RecordingHandle) -> Result<()> {
		self.journal.record(Call::ScannerStop(handle.to_string()));
		let mut current = self.current.lock();
		if current.as_ref().is_some_and(|(_, running)| running == handle) {
			*current = None;
		}
		Ok(())
	}
}

struct FakeNavigation(Arc<Journal>);

#[async_trait]
impl NavigationClient for FakeNavigation {
	async fn stop(&self) -> Result<()> {
		self.0.record(Call::NavigationStop);
		Ok(())
	}
}

struct FakeMapPersister {
	journal: Arc<Journal>,
	fail: AtomicBool,
}

#[async_trait]
impl MapPersister for FakeMapPersister {
	async fn save(&self, map: &MapRef) -> Result<()> {
		self.journal.record(Call::MapSave(map.id));
		if self.fail.load(Ordering::SeqCst) {
			return Err(Error::Collaborator {
				name: "map persister",
				message: "map service unavailable".into(),
			});
		}
		Ok(())
	}
}

struct FakeTrajectoryPersister(Arc<Journal>);

#[async_trait]
impl TrajectoryPersister for FakeTrajectoryPersister {
	async fn save(&self, handle: &RecordingHandle) -> Result<()> {
		self.0.record(Call::TrajectorySave(handle.to_string()));
		Ok(())
	}
}

struct Harness {
	controller: Arc<SessionController>,
	bridge: Arc<FakeBridge>,
	scanner: Arc<FakeScanner>,
	map_persister: Arc<FakeMapPersister>,
	journal: Arc<Journal>,
}

impl Harness {
	fn new() -> Self {
		Self::with_settings(SessionSettings::default())
	}

	fn with_settings(settings: SessionSettings) -> Self {
		let journal = Arc::new(Journal::default());
		let bridge = Arc::new(FakeBridge {
			connected: AtomicBool::new(true),
			link: Arc::new(ScriptedLink {
				journal: journal.clone(),
				responses: Mutex::new(VecDeque::new()),
			}),
		});
		let scanner = Arc::new(FakeScanner {
			journal: journal.clone(),
			..FakeScanner::default()
		});
		let map_persister = Arc::new(FakeMapPersister {
			journal: journal.clone(),
			fail: AtomicBool::new(false),
		});
		let collaborators = Collaborators {
			scanner: scanner.clone(),
			navigation: Arc::new(FakeNavigation(journal.clone())),
			map_persister: map_persister.clone(),
			trajectory_persister: Arc::new(FakeTrajectoryPersister(journal.clone())),
		};
		let controller = Arc::new(SessionController::new(bridge.clone(), collaborators, settings));
		Self {
			controller,
			bridge,
			scanner,
			map_persister,
			journal,
		}
	}

	fn respond(&self, response: survey_runtime::Result<Value>) {
		self.bridge.link.responses.lock().push_back(response);
	}
}

fn map(id: u64) -> MapRef {
	MapRef::new(id, format!("map-{id}"))
}

async fn settle() {
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
}

#[tokio::test(start_paused = true)]
async fn test_start_exploration_calls_collection_and_stores_handle() {
	let h = Harness::new();

	h.controller.start_exploration(map(1)).await.unwrap();

	assert_eq!(
		h.journal.calls(),
		vec![
			Call::ScannerStart(1),
			Call::Service(
				"/data_collector/start".into(),
				json!({"name": "exploration", "topics": ["/scan", "/odom"], "store_rosbag": true})
			),
		]
	);
	let status = h.controller.status();
	assert!(status.active);
	assert_eq!(status.mode, Some(SessionMode::Exploration));
	assert_eq!(status.map, Some(map(1)));
	assert_eq!(status.recording, Some(RecordingHandle::new("rec-1")));
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_has_no_side_effects() {
	let h = Harness::new();
	h.controller.start_exploration(map(1)).await.unwrap();
	let before = h.journal.calls();

	let err = h.controller.start_exploration(map(2)).await.unwrap_err();
	assert!(matches!(err, SessionError::SessionAlreadyActive));
	let err = h.controller.start_measurement(map(2)).await.unwrap_err();
	assert!(matches!(err, SessionError::SessionAlreadyActive));

	assert_eq!(h.journal.calls(), before);
	assert_eq!(h.controller.status().map, Some(map(1)));
}

#[tokio::test(start_paused = true)]
async fn test_start_while_disconnected_has_no_side_effects() {
	let h = Harness::new();
	h.bridge.connected.store(false, Ordering::SeqCst);

	let err = h.controller.start_exploration(map(1)).await.unwrap_err();
	assert!(matches!(err, SessionError::NotConnected));
	let err = h.controller.start_measurement(map(1)).await.unwrap_err();
	assert!(matches!(err, SessionError::NotConnected));

	assert!(h.journal.calls().is_empty());
	assert!(!h.controller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_admit_one_session() {
	let h = Harness::new();

	let (first, second) = tokio::join!(
		h.controller.start_exploration(map(1)),
		h.controller.start_exploration(map(2))
	);

	assert!(first.is_ok());
	assert!(matches!(second, Err(SessionError::SessionAlreadyActive)));
	assert_eq!(h.journal.count(|c| matches!(c, Call::ScannerStart(_))), 1);
	assert_eq!(h.journal.count(|c| matches!(c, Call::Service(..))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_measurement_skips_collection_call() {
	let h = Harness::new();

	h.controller.start_measurement(map(4)).await.unwrap();

	assert_eq!(h.journal.calls(), vec![Call::ScannerStart(4)]);
	assert_eq!(h.controller.status().mode, Some(SessionMode::Measurement));
}

#[tokio::test(start_paused = true)]
async fn test_exploration_stop_sequence() {
	let h = Harness::new();
	h.controller.start_exploration(map(1)).await.unwrap();

	h.controller.stop().await;

	assert!(!h.controller.is_active());
	assert_eq!(
		&h.journal.calls()[2..],
		&[Call::ScannerStop("rec-1".into()), Call::NavigationStop, Call::MapSave(1)]
	);
	assert_eq!(h.scanner.recording(), None);

	tokio::time::sleep(Duration::from_millis(1999)).await;
	settle().await;
	assert_eq!(h.journal.count(|c| matches!(c, Call::TrajectorySave(_))), 0);

	tokio::time::sleep(Duration::from_millis(2)).await;
	settle().await;
	assert_eq!(h.journal.count(|c| *c == Call::TrajectorySave("rec-1".into())), 1);

	let map_saved = h.journal.time_of(|c| matches!(c, Call::MapSave(_))).unwrap();
	let trajectory_saved = h.journal.time_of(|c| matches!(c, Call::TrajectorySave(_))).unwrap();
	assert!(trajectory_saved - map_saved >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_double_stop_persists_once() {
	let h = Harness::new();
	h.controller.start_exploration(map(1)).await.unwrap();

	h.controller.stop().await;
	h.controller.stop().await;
	h.controller.flush_persistence().await;

	assert_eq!(h.journal.count(|c| matches!(c, Call::MapSave(_))), 1);
	assert_eq!(h.journal.count(|c| matches!(c, Call::TrajectorySave(_))), 1);
	assert_eq!(h.journal.count(|c| matches!(c, Call::ScannerStop(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_measurement_stop_only_stops_scanner() {
	let h = Harness::new();
	h.controller.start_measurement(map(2)).await.unwrap();

	h.controller.stop().await;
	tokio::time::sleep(Duration::from_secs(10)).await;
	h.controller.flush_persistence().await;

	assert_eq!(h.journal.calls(), vec![Call::ScannerStart(2), Call::ScannerStop("rec-1".into())]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_idle_is_a_no_op() {
	let h = Harness::new();

	h.controller.stop().await;

	assert!(h.journal.calls().is_empty());
	assert_eq!(
		h.controller.status(),
		SessionStatus {
			active: false,
			mode: None,
			map: None,
			recording: None,
		}
	);
}

#[tokio::test(start_paused = true)]
async fn test_collection_failure_is_returned_and_rolled_back() {
	let h = Harness::new();
	h.respond(Ok(json!({"success": false, "message": "already recording"})));

	let err = h.controller.start_exploration(map(1)).await.unwrap_err();
	match err {
		SessionError::ServiceCallFailure { service, message } => {
			assert_eq!(service, "/data_collector/start");
			assert_eq!(message, "already recording");
		}
		other => panic!("expected ServiceCallFailure, got {other:?}"),
	}
	assert!(!h.controller.is_active());
	assert_eq!(h.journal.count(|c| *c == Call::ScannerStop("rec-1".into())), 1);
	assert_eq!(h.scanner.recording(), None);

	h.controller.start_exploration(map(1)).await.unwrap();
	assert!(h.controller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_collection_transport_failure_is_returned() {
	let h = Harness::new();
	h.respond(Err(survey_runtime::Error::ChannelClosed));

	let err = h.controller.start_exploration(map(1)).await.unwrap_err();
	assert!(matches!(err, SessionError::Transport(survey_runtime::Error::ChannelClosed)));
	assert!(!h.controller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_scanner_failure_rolls_back() {
	let h = Harness::new();
	h.scanner.fail.store(true, Ordering::SeqCst);

	let err = h.controller.start_measurement(map(3)).await.unwrap_err();
	assert!(matches!(err, SessionError::Scanner(Error::Collaborator { .. })));
	assert!(!h.controller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_pending_scanner_start() {
	let h = Harness::new();
	let (release, gate) = oneshot::channel();
	*h.scanner.gate.lock() = Some(gate);

	let pending = {
		let controller = h.controller.clone();
		tokio::spawn(async move { controller.start_exploration(map(1)).await })
	};
	settle().await;
	assert!(h.controller.is_active());
	assert_eq!(h.controller.status().recording, None);

	h.controller.stop().await;
	assert_eq!(h.journal.count(|c| matches!(c, Call::ScannerStop(_))), 0);
	h.controller.start_measurement(map(2)).await.unwrap();
	assert_eq!(h.scanner.recording(), Some(RecordingHandle::new("rec-2")));

	release.send(()).unwrap();
	let err = pending.await.unwrap().unwrap_err();
	assert!(matches!(err, SessionError::Interrupted));

	// only the late recording was stopped; the new session keeps recording
	assert_eq!(
		h.journal.count(|c| matches!(c, Call::ScannerStop(_))),
		h.journal.count(|c| *c == Call::ScannerStop("rec-1".into()))
	);
	assert_eq!(h.journal.count(|c| *c == Call::ScannerStop("rec-1".into())), 1);
	assert_eq!(h.scanner.recording(), Some(RecordingHandle::new("rec-2")));
	let status = h.controller.status();
	assert_eq!(status.mode, Some(SessionMode::Measurement));
	assert_eq!(status.map, Some(map(2)));
	assert_eq!(status.recording, Some(RecordingHandle::new("rec-2")));

	h.controller.flush_persistence().await;
	assert_eq!(h.journal.count(|c| *c == Call::TrajectorySave("rec-1".into())), 1);
}

#[tokio::test(start_paused = true)]
async fn test_collection_failure_after_newer_start_keeps_newer_recording() {
	let h = Harness::new();
	h.respond(Ok(json!({"success": false, "message": "already recording"})));
	let (release, gate) = oneshot::channel();
	*h.scanner.gate.lock() = Some(gate);

	let pending = {
		let controller = h.controller.clone();
		tokio::spawn(async move { controller.start_exploration(map(1)).await })
	};
	settle().await;
	h.controller.stop().await;
	h.controller.start_measurement(map(2)).await.unwrap();

	release.send(()).unwrap();
	let err = pending.await.unwrap().unwrap_err();
	assert!(matches!(err, SessionError::ServiceCallFailure { .. }));

	assert_eq!(h.journal.count(|c| *c == Call::ScannerStop("rec-1".into())), 1);
	assert_eq!(h.scanner.recording(), Some(RecordingHandle::new("rec-2")));
	assert!(h.controller.is_active());
	assert_eq!(h.controller.status().map, Some(map(2)));
}

#[tokio::test(start_paused = true)]
async fn test_trajectory_save_gives_up_on_scanner_that_never_resolves() {
	let h = Harness::with_settings(SessionSettings {
		recording_wait: Duration::from_secs(3),
		..SessionSettings::default()
	});
	let (_release, gate) = oneshot::channel::<()>();
	*h.scanner.gate.lock() = Some(gate);

	let _pending = {
		let controller = h.controller.clone();
		tokio::spawn(async move { controller.start_exploration(map(1)).await })
	};
	settle().await;
	let stopped_at = Instant::now();
	h.controller.stop().await;

	h.controller.flush_persistence().await;
	assert!(stopped_at.elapsed() >= Duration::from_secs(5));
	assert!(stopped_at.elapsed() < Duration::from_secs(6));
	assert_eq!(h.journal.count(|c| matches!(c, Call::TrajectorySave(_))), 0);
	assert_eq!(h.journal.count(|c| *c == Call::MapSave(1)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_trajectory_save_skipped_when_scanner_never_started() {
	let h = Harness::new();
	let (release, gate) = oneshot::channel();
	*h.scanner.gate.lock() = Some(gate);
	h.scanner.fail.store(true, Ordering::SeqCst);

	let pending = {
		let controller = h.controller.clone();
		tokio::spawn(async move { controller.start_exploration(map(1)).await })
	};
	settle().await;
	h.controller.stop().await;

	release.send(()).unwrap();
	assert!(matches!(pending.await.unwrap(), Err(SessionError::Scanner(_))));

	h.controller.flush_persistence().await;
	assert_eq!(h.journal.count(|c| matches!(c, Call::TrajectorySave(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_map_save_failure_does_not_abort_cleanup() {
	let h = Harness::new();
	h.map_persister.fail.store(true, Ordering::SeqCst);
	h.controller.start_exploration(map(1)).await.unwrap();

	h.controller.stop().await;
	h.controller.flush_persistence().await;

	assert_eq!(h.journal.count(|c| *c == Call::TrajectorySave("rec-1".into())), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_persistence_drops_scheduled_save() {
	let h = Harness::new();
	h.controller.start_exploration(map(1)).await.unwrap();

	h.controller.stop().await;
	h.controller.cancel_persistence();
	tokio::time::sleep(Duration::from_secs(5)).await;
	settle().await;

	assert_eq!(h.journal.count(|c| matches!(c, Call::TrajectorySave(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_end_collection_on_stop() {
	let h = Harness::with_settings(SessionSettings {
		end_collection_on_stop: true,
		..SessionSettings::default()
	});
	h.controller.start_exploration(map(1)).await.unwrap();

	h.controller.stop().await;

	assert_eq!(
		&h.journal.calls()[2..],
		&[
			Call::ScannerStop("rec-1".into()),
			Call::Service("/data_collector/end".into(), json!({})),
			Call::NavigationStop,
			Call::MapSave(1),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn test_custom_collection_request() {
	let mut settings = SessionSettings::default();
	settings.collection.topics.push("/tf".into());
	settings.collection.store_rosbag = false;
	let h = Harness::with_settings(settings);

	h.controller.start_exploration(map(1)).await.unwrap();

	let args = h
		.journal
		.calls()
		.into_iter()
		.find_map(|c| match c {
			Call::Service(_, args) => Some(args),
			_ => None,
		})
		.unwrap();
	assert_eq!(args["topics"], json!(["/scan", "/odom", "/tf"]));
	assert_eq!(args["store_rosbag"], false);
}
