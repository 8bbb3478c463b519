//! Transport supervision and reconnection.
//!
//! [`TransportSupervisor`] owns the link to the bridge and runs an explicit
//! `Disconnected → Connecting → Connected` state machine. Every connection
//! attempt gets a fresh epoch; events from an older link or attempt are
//! ignored. An outage schedules exactly one reconnect timer, however many
//! error/close events it produces.
//!
//! Reconnection uses a fixed delay with unbounded retries. The
//! [`ConnectionStatus`] watch channel is the health signal for long outages.


use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::link::{LinkFuture, LinkProvider, RosLink};
use crate::service::{CollectionServiceNames, CollectionServices};
use crate::transport::WebSocketTransport;

/// Default delay between a lost link and the next attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// Connection state of the supervised link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

/// Observable transport conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	Connected,
	Error(String),
	Closed,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct ConnectionStatus {
	pub state: LinkState,
	/// Outages and failed attempts since the last successful connect.
	pub consecutive_failures: u32,
	pub last_error: Option<String>,
}

impl ConnectionStatus {
	pub fn is_connected(&self) -> bool {
		self.state == LinkState::Connected
	}
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// `ws://host:port` of the rosbridge server.
	pub url: String,
	pub reconnect_interval: Duration,
	pub services: CollectionServiceNames,
}

impl SupervisorConfig {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
			services: CollectionServiceNames::default(),
		}
	}
}

/// Derives the bridge WebSocket URL from a `ROS_MASTER_URI`-style URI.
///
/// Only the host is kept: `http://robot:11311` becomes `ws://robot:9090`.
pub fn bridge_url(master_uri: &str, port: u16) -> Result<String> {
	let parsed = Url::parse(master_uri).map_err(|e| Error::InvalidUrl(format!("{master_uri}: {e}")))?;
	let host = parsed
		.host_str()
		.filter(|host| !host.is_empty())
		.ok_or_else(|| Error::InvalidUrl(format!("{master_uri}: missing host")))?;
	Ok(format!("ws://{host}:{port}"))
}

/// A freshly established link plus its close notification.
///
/// `closed` resolves with `Some(reason)` when the link failed and `None`
/// when it closed cleanly. A dropped sender counts as a clean close.
pub struct Established {
	pub link: Arc<dyn RosLink>,
	pub closed: oneshot::Receiver<Option<String>>,
}

/// Opens links to the bridge.
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, url: &'a str) -> LinkFuture<'a, Established>;
}

/// Production connector: WebSocket transport plus a [`Connection`] whose
/// dispatch loop runs on a spawned task.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
	fn connect<'a>(&'a self, url: &'a str) -> LinkFuture<'a, Established> {
		Box::pin(async move {
			let (transport, message_rx) = WebSocketTransport::connect(url).await?;
			let connection = Arc::new(Connection::new(transport.into_transport_parts(message_rx)));

			let (closed_tx, closed) = oneshot::channel();
			let runner = Arc::clone(&connection);
			tokio::spawn(async move {
				let outcome = runner.run().await;
				let _ = closed_tx.send(outcome.err().map(|e| e.to_string()));
			});

			Ok(Established {
				link: connection,
				closed,
			})
		})
	}
}

struct LinkSlot {
	epoch: u64,
	link: Option<Arc<dyn RosLink>>,
	services: Option<CollectionServices>,
	reconnect: Option<JoinHandle<()>>,
	shutdown: bool,
}

struct Inner {
	config: SupervisorConfig,
	connector: Arc<dyn Connector>,
	status: watch::Sender<ConnectionStatus>,
	events: broadcast::Sender<TransportEvent>,
	slot: Mutex<LinkSlot>,
}

/// Owns the bridge link and keeps it alive.
///
/// Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct TransportSupervisor {
	inner: Arc<Inner>,
}

impl TransportSupervisor {
	pub fn new(config: SupervisorConfig, connector: Arc<dyn Connector>) -> Self {
		let (status, _) = watch::channel(ConnectionStatus::default());
		let (events, _) = broadcast::channel(32);
		Self {
			inner: Arc::new(Inner {
				config,
				connector,
				status,
				events,
				slot: Mutex::new(LinkSlot {
					epoch: 0,
					link: None,
					services: None,
					reconnect: None,
					shutdown: false,
				}),
			}),
		}
	}

	/// Supervisor using the production WebSocket connector.
	pub fn websocket(config: SupervisorConfig) -> Self {
		Self::new(config, Arc::new(WebSocketConnector))
	}

	pub fn url(&self) -> &str {
		&self.inner.config.url
	}

	/// Starts connecting unless a link is up or an attempt is in flight.
	///
	/// From `Disconnected` a pending reconnect timer is cancelled and the
	/// attempt happens now. Does nothing after [`shutdown`](Self::shutdown).
	pub fn connect(&self) {
		let epoch = {
			let mut slot = self.inner.slot.lock();
			if slot.shutdown {
				debug!("connect ignored: supervisor shut down");
				return;
			}
			if self.inner.status.borrow().state != LinkState::Disconnected {
				debug!("connect ignored: already connecting or connected");
				return;
			}
			if let Some(timer) = slot.reconnect.take() {
				timer.abort();
			}
			self.inner.begin_attempt(&mut slot)
		};

		let inner = Arc::clone(&self.inner);
		tokio::spawn(async move { inner.attempt(epoch).await });
	}

	pub fn is_connected(&self) -> bool {
		self.inner.status.borrow().is_connected()
	}

	pub fn status(&self) -> ConnectionStatus {
		self.inner.status.borrow().clone()
	}

	pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
		self.inner.status.subscribe()
	}

	/// Stream of `Connected`/`Error`/`Closed` conditions.
	pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
		self.inner.events.subscribe()
	}

	/// Waits until the link is up.
	pub async fn wait_until_connected(&self) -> Result<()> {
		let mut status = self.subscribe_status();
		status
			.wait_for(ConnectionStatus::is_connected)
			.await
			.map(|_| ())
			.map_err(|_| Error::ChannelClosed)
	}

	/// Service proxies bound to the live link, if connected.
	pub fn services(&self) -> Option<CollectionServices> {
		self.inner.slot.lock().services.clone()
	}

	/// Cancels any pending reconnect, closes the live link and stops
	/// reconnecting for good.
	pub fn shutdown(&self) {
		let link = {
			let mut slot = self.inner.slot.lock();
			slot.shutdown = true;
			if let Some(timer) = slot.reconnect.take() {
				timer.abort();
			}
			slot.services = None;
			slot.link.take()
		};
		info!(url = %self.inner.config.url, "shutting down transport supervisor");
		if let Some(link) = link {
			link.close();
		}
		self.inner.status.send_modify(|status| status.state = LinkState::Disconnected);
	}
}

impl LinkProvider for TransportSupervisor {
	fn link(&self) -> Option<Arc<dyn RosLink>> {
		self.inner.slot.lock().link.clone()
	}
}

impl Inner {
	/// Opens a new epoch and marks the state `Connecting`. Caller holds the slot.
	fn begin_attempt(&self, slot: &mut LinkSlot) -> u64 {
		slot.epoch += 1;
		self.status.send_modify(|status| status.state = LinkState::Connecting);
		slot.epoch
	}

	async fn attempt(self: Arc<Self>, epoch: u64) {
		debug!(url = %self.config.url, epoch, "connecting to rosbridge");
		match self.connector.connect(&self.config.url).await {
			Ok(established) => self.on_connected(epoch, established),
			Err(e) => self.handle_event(epoch, TransportEvent::Error(e.to_string())),
		}
	}

	fn on_connected(self: &Arc<Self>, epoch: u64, established: Established) {
		let Established { link, closed } = established;
		{
			let mut slot = self.slot.lock();
			if slot.shutdown || slot.epoch != epoch {
				drop(slot);
				debug!(epoch, "discarding link from a superseded attempt");
				link.close();
				return;
			}
			slot.services = Some(CollectionServices::bind(Arc::clone(&link), &self.config.services));
			slot.link = Some(link);
			self.status.send_replace(ConnectionStatus {
				state: LinkState::Connected,
				consecutive_failures: 0,
				last_error: None,
			});
		}
		info!(url = %self.config.url, epoch, "connected to rosbridge");
		let _ = self.events.send(TransportEvent::Connected);

		let inner = Arc::clone(self);
		tokio::spawn(async move {
			match closed.await {
				Ok(Some(reason)) => {
					inner.handle_event(epoch, TransportEvent::Error(reason));
					inner.handle_event(epoch, TransportEvent::Closed);
				}
				Ok(None) | Err(_) => inner.handle_event(epoch, TransportEvent::Closed),
			}
		});
	}

	/// Applies an `Error` or `Closed` condition for the link of `epoch`.
	fn handle_event(self: &Arc<Self>, epoch: u64, event: TransportEvent) {
		let mut slot = self.slot.lock();
		if slot.epoch != epoch {
			debug!(epoch, current = slot.epoch, ?event, "ignoring event from a stale link");
			return;
		}

		let reason = match &event {
			TransportEvent::Connected => {
				debug!(epoch, "connected events are applied by on_connected");
				return;
			}
			TransportEvent::Error(reason) => {
				warn!(url = %self.config.url, %reason, "rosbridge transport error");
				Some(reason.clone())
			}
			TransportEvent::Closed => {
				warn!(url = %self.config.url, "rosbridge connection closed");
				None
			}
		};
		let _ = self.events.send(event);

		slot.link = None;
		slot.services = None;

		let pending = slot.reconnect.as_ref().is_some_and(|timer| !timer.is_finished());
		let schedule = !slot.shutdown && !pending;
		self.status.send_modify(|status| {
			status.state = LinkState::Disconnected;
			if reason.is_some() {
				status.last_error = reason;
			}
			if schedule {
				status.consecutive_failures += 1;
			}
		});

		if slot.shutdown {
			return;
		}
		if pending {
			debug!("reconnect already scheduled for this outage");
			return;
		}

		let delay = self.config.reconnect_interval;
		info!(delay_ms = delay.as_millis() as u64, "scheduling rosbridge reconnect");
		let inner = Arc::clone(self);
		slot.reconnect = Some(tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let epoch = {
				let mut slot = inner.slot.lock();
				slot.reconnect = None;
				if slot.shutdown {
					return;
				}
				inner.begin_attempt(&mut slot)
			};
			info!(url = %inner.config.url, "reconnecting to rosbridge");
			inner.attempt(epoch).await;
		}));
	}
}
