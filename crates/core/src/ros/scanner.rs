//! Wifi scanner recording samples from a rosbridge topic.
//!
//! Each recording owns a writer task fed by a topic subscription. When the
//! subscription ends while recording, because the link went away, the task
//! resubscribes on the next link the provider hands out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use survey_runtime::{LinkProvider, RosLink};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::live_link;
use crate::artifacts::{ArtifactStore, unix_millis};
use crate::collaborators::Scanner;
use crate::error::{Error, Result};
use crate::model::{MapRef, RecordingHandle};

/// Default retry period for resubscribing after the link drops.
const DEFAULT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(1);

/// One line of `recordings/<handle>.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiSample {
	pub map_id: u64,
	pub received_at_ms: u64,
	pub sample: Value,
}

struct ActiveRecording {
	/// Order in which the owning `start` call began.
	ticket: u64,
	handle: RecordingHandle,
	stop_tx: oneshot::Sender<()>,
	writer: JoinHandle<Result<u64>>,
}

/// Records every message on the wifi topic as a JSON line.
pub struct WifiScanner {
	links: Arc<dyn LinkProvider>,
	store: ArtifactStore,
	topic: String,
	message_type: String,
	resubscribe_interval: Duration,
	tickets: AtomicU64,
	active: Mutex<Option<ActiveRecording>>,
}

impl WifiScanner {
	pub fn new(links: Arc<dyn LinkProvider>, store: ArtifactStore, topic: &str, message_type: &str) -> Self {
		Self {
			links,
			store,
			topic: topic.to_string(),
			message_type: message_type.to_string(),
			resubscribe_interval: DEFAULT_RESUBSCRIBE_INTERVAL,
			tickets: AtomicU64::new(0),
			active: Mutex::new(None),
		}
	}

	pub fn with_resubscribe_interval(mut self, interval: Duration) -> Self {
		self.resubscribe_interval = interval;
		self
	}

	pub fn is_recording(&self) -> bool {
		self.active.lock().is_some()
	}

	/// Handle of the running recording, if any.
	pub fn recording(&self) -> Option<RecordingHandle> {
		self.active.lock().as_ref().map(|active| active.handle.clone())
	}

	async fn finish(&self, recording: ActiveRecording) -> Result<()> {
		let ActiveRecording {
			handle,
			stop_tx,
			writer,
			..
		} = recording;

		let _ = stop_tx.send(());
		match writer.await {
			Ok(Ok(samples)) => {
				info!(recording = %handle, samples, "wifi recording stopped");
				Ok(())
			}
			Ok(Err(e)) => Err(e),
			Err(e) => Err(Error::Collaborator {
				name: "wifi scanner",
				message: format!("recording task failed: {e}"),
			}),
		}
	}
}

#[async_trait]
impl Scanner for WifiScanner {
	async fn start(&self, map: &MapRef) -> Result<RecordingHandle> {
		let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
		let previous = self.active.lock().take();
		if let Some(previous) = previous {
			warn!(recording = %previous.handle, "scanner started while recording; stopping previous recording");
			if let Err(e) = self.finish(previous).await {
				warn!(error = %e, "previous recording ended with an error");
			}
		}

		let link = live_link(self.links.as_ref())?;
		let handle = RecordingHandle::new(format!("{}-{}", map.id, unix_millis()));
		let (path, file) = self.store.open_append("recordings", &format!("{handle}.jsonl")).await?;
		let samples = link.subscribe(&self.topic, &self.message_type).await?;

		let mut active = self.active.lock();
		if let Some(newer) = active.as_ref().filter(|current| current.ticket > ticket) {
			// the topic stays subscribed for the newer recording; only our receiver goes
			warn!(recording = %handle, newer = %newer.handle, "scanner start superseded by a newer one, recording nothing");
			return Ok(handle);
		}

		let (stop_tx, stop_rx) = oneshot::channel();
		let feed = Feed {
			links: Arc::clone(&self.links),
			link,
			topic: self.topic.clone(),
			message_type: self.message_type.clone(),
			retry: self.resubscribe_interval,
		};
		let writer = tokio::spawn(record(feed, samples, stop_rx, file, map.id));
		info!(recording = %handle, topic = %self.topic, path = %path.display(), "wifi recording started");

		*active = Some(ActiveRecording {
			ticket,
			handle: handle.clone(),
			stop_tx,
			writer,
		});
		Ok(handle)
	}

	async fn stop(&self, handle: &RecordingHandle) -> Result<()> {
		let active = {
			let mut active = self.active.lock();
			if active.as_ref().is_some_and(|current| &current.handle == handle) {
				active.take()
			} else {
				None
			}
		};
		match active {
			Some(recording) => self.finish(recording).await,
			None => {
				debug!(recording = %handle, "recording not running, nothing to stop");
				Ok(())
			}
		}
	}
}

/// Subscription feeding one recording and the link it lives on.
struct Feed {
	links: Arc<dyn LinkProvider>,
	link: Arc<dyn RosLink>,
	topic: String,
	message_type: String,
	retry: Duration,
}

impl Feed {
	/// Subscribes on the first link other than the lost one. `None` once a
	/// stop is requested.
	async fn resubscribe(&mut self, stop_rx: &mut oneshot::Receiver<()>) -> Option<mpsc::UnboundedReceiver<Value>> {
		let mut retry = tokio::time::interval(self.retry);
		retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				_ = &mut *stop_rx => return None,
				_ = retry.tick() => {}
			}
			let Some(link) = self.links.link() else {
				continue;
			};
			if std::ptr::addr_eq(Arc::as_ptr(&link), Arc::as_ptr(&self.link)) {
				continue;
			}
			match link.subscribe(&self.topic, &self.message_type).await {
				Ok(samples) => {
					info!(topic = %self.topic, "wifi topic resubscribed on the new link");
					self.link = link;
					return Some(samples);
				}
				Err(e) => warn!(topic = %self.topic, error = %e, "resubscribe failed, retrying"),
			}
		}
	}
}

/// Appends samples until a stop is requested; returns the number of samples
/// written. Queued samples are drained before returning.
async fn record(
	mut feed: Feed,
	mut samples: mpsc::UnboundedReceiver<Value>,
	mut stop_rx: oneshot::Receiver<()>,
	file: tokio::fs::File,
	map_id: u64,
) -> Result<u64> {
	let mut out = BufWriter::new(file);
	let mut written = 0u64;

	loop {
		tokio::select! {
			sample = samples.recv() => match sample {
				Some(sample) => {
					write_sample(&mut out, map_id, sample).await?;
					written += 1;
				}
				None => {
					warn!(topic = %feed.topic, samples = written, "wifi subscription ended while recording, waiting for a new link");
					out.flush().await?;
					match feed.resubscribe(&mut stop_rx).await {
						Some(renewed) => samples = renewed,
						None => return Ok(written),
					}
				}
			},
			_ = &mut stop_rx => {
				while let Ok(sample) = samples.try_recv() {
					write_sample(&mut out, map_id, sample).await?;
					written += 1;
				}
				break;
			}
		}
	}

	if let Err(e) = feed.link.unsubscribe(&feed.topic).await {
		warn!(topic = %feed.topic, error = %e, "unsubscribe failed");
	}
	out.flush().await?;
	Ok(written)
}

async fn write_sample(out: &mut BufWriter<tokio::fs::File>, map_id: u64, sample: Value) -> Result<()> {
	let line = WifiSample {
		map_id,
		received_at_ms: unix_millis(),
		sample,
	};
	let mut bytes = serde_json::to_vec(&line)?;
	bytes.push(b'\n');
	out.write_all(&bytes).await?;
	Ok(())
}
