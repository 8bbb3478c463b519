//! rosbridge connection layer
//!
//! This module implements request/response correlation and topic fan-out on
//! top of the transport. It handles:
//! - Generating unique operation IDs
//! - Correlating `service_response` frames with pending `call_service` requests
//! - Advertising topics before the first publish
//! - Forwarding `publish` frames to local subscribers
//!
//! # Message Flow
//!
//! 1. Caller invokes `call_service()` with service name, type, and args
//! 2. Connection generates a unique ID and registers a oneshot channel
//! 3. The `call_service` op is queued for the writer task
//! 4. Caller awaits the oneshot receiver
//! 5. The dispatch loop receives the matching `service_response`
//! 6. The result is sent through the oneshot channel
//!
//! When the transport ends every pending request fails with
//! [`Error::ChannelClosed`] and every subscriber stream terminates.


use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde_json::Value;
use survey_protocol::{Incoming, Op, StatusLevel};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::link::{LinkFuture, RosLink};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Pending service calls keyed by operation ID.
type CallbackMap = Arc<DashMap<String, oneshot::Sender<Result<Value>>>>;

/// Item consumed by the writer task.
enum Outbound {
	Frame(Value),
	Close,
}

/// Local subscribers of one topic, sharing a single bridge subscription.
struct TopicSubscription {
	id: String,
	senders: Vec<mpsc::UnboundedSender<Value>>,
}

/// Halves taken once by [`Connection::run`].
struct RunParts {
	sender: Box<dyn Transport>,
	receiver: Box<dyn TransportReceiver>,
	message_rx: mpsc::UnboundedReceiver<Value>,
	outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: String,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: String, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.remove(&self.id).is_some() {
			debug!(id = %self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::call_service`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Connection to a rosbridge server.
///
/// Uses sequential operation IDs and oneshot channels for correlation.
pub struct Connection {
	/// Sequential operation counter shared by every op kind
	last_id: AtomicU64,
	/// Pending service calls keyed by operation ID
	callbacks: CallbackMap,
	/// Local subscribers keyed by topic
	subscriptions: DashMap<String, TopicSubscription>,
	/// Topics already advertised on this connection
	advertised: DashSet<String>,
	/// Channel for sending outbound frames to the writer task
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	/// Set once the dispatch loop has ended
	closed: AtomicBool,
	/// Transport halves and channels (taken by run())
	parts: Mutex<Option<RunParts>>,
}

impl Connection {
	/// Create a new Connection with the given transport
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU64::new(0),
			callbacks: Arc::new(DashMap::new()),
			subscriptions: DashMap::new(),
			advertised: DashSet::new(),
			outbound_tx,
			closed: AtomicBool::new(false),
			parts: Mutex::new(Some(RunParts {
				sender,
				receiver,
				message_rx,
				outbound_rx,
			})),
		}
	}

	fn next_id(&self, kind: &str, name: &str) -> String {
		let n = self.last_id.fetch_add(1, Ordering::SeqCst);
		format!("{kind}:{name}:{n}")
	}

	fn send_op(&self, op: &Op) -> Result<()> {
		let value = serde_json::to_value(op)?;
		tracing::trace!(frame = %value, "queueing rosbridge op");
		self.outbound_tx.send(Outbound::Frame(value)).map_err(|_| {
			error!("Failed to queue op: outbound channel closed");
			Error::ChannelClosed
		})
	}

	/// Returns true once the dispatch loop has stopped.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Calls a ROS service and awaits the response values.
	pub async fn call_service(&self, service: &str, service_type: &str, args: Value) -> Result<Value> {
		let id = self.next_id("call_service", service);
		debug!(%id, service, "calling service");

		let (tx, rx) = oneshot::channel();
		self.callbacks.insert(id.clone(), tx);
		let guard = CancelGuard::new(id.clone(), Arc::clone(&self.callbacks));

		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let op = Op::CallService {
			id,
			service: service.to_string(),
			service_type: (!service_type.is_empty()).then(|| service_type.to_string()),
			args,
		};
		self.send_op(&op)?;

		ResponseFuture { rx, guard }.await
	}

	/// Publishes on `topic`, advertising it on first use.
	pub fn publish(&self, topic: &str, message_type: &str, message: Value) -> Result<()> {
		if self.advertised.insert(topic.to_string()) {
			debug!(topic, message_type, "advertising topic");
			self.send_op(&Op::Advertise {
				id: self.next_id("advertise", topic),
				topic: topic.to_string(),
				message_type: message_type.to_string(),
			})?;
		}

		self.send_op(&Op::Publish {
			topic: topic.to_string(),
			msg: message,
		})
	}

	/// Registers a local subscriber, subscribing on the bridge for the first one.
	pub fn subscribe(&self, topic: &str, message_type: &str) -> Result<mpsc::UnboundedReceiver<Value>> {
		let (tx, rx) = mpsc::unbounded_channel();

		let new_subscription = {
			let mut created = None;
			let mut entry = self.subscriptions.entry(topic.to_string()).or_insert_with(|| {
				let id = self.next_id("subscribe", topic);
				created = Some(id.clone());
				TopicSubscription {
					id,
					senders: Vec::new(),
				}
			});
			entry.senders.push(tx);
			created
		};

		if let Some(id) = new_subscription {
			debug!(topic, message_type, "subscribing to topic");
			self.send_op(&Op::Subscribe {
				id,
				topic: topic.to_string(),
				message_type: (!message_type.is_empty()).then(|| message_type.to_string()),
			})?;
		}

		Ok(rx)
	}

	/// Drops every local subscriber of `topic` and unsubscribes on the bridge.
	pub fn unsubscribe(&self, topic: &str) -> Result<()> {
		match self.subscriptions.remove(topic) {
			Some((topic, subscription)) => {
				debug!(%topic, "unsubscribing from topic");
				self.send_op(&Op::Unsubscribe {
					id: subscription.id,
					topic,
				})
			}
			None => Ok(()),
		}
	}

	/// Asks the writer task to close the socket.
	pub fn close(&self) {
		if self.outbound_tx.send(Outbound::Close).is_err() {
			debug!("close requested on a connection that is already down");
		}
	}

	/// Run the message dispatch loop.
	///
	/// Returns `Ok(())` when the bridge closed the socket cleanly and the
	/// transport error otherwise.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let RunParts {
			mut sender,
			mut receiver,
			mut message_rx,
			mut outbound_rx,
		} = self
			.parts
			.lock()
			.take()
			.ok_or_else(|| Error::ProtocolError("run() can only be called once".to_string()))?;

		let reader_handle = tokio::spawn(async move { receiver.run().await });

		let writer_handle = tokio::spawn(async move {
			while let Some(outbound) = outbound_rx.recv().await {
				match outbound {
					Outbound::Frame(message) => {
						if let Err(e) = sender.send(message).await {
							error!(error = %e, "Transport write error");
							break;
						}
					}
					Outbound::Close => {
						if let Err(e) = sender.close().await {
							debug!(error = %e, "close handshake failed");
						}
						break;
					}
				}
			}
		});

		while let Some(value) = message_rx.recv().await {
			match serde_json::from_value::<Incoming>(value) {
				Ok(incoming) => {
					if let Err(e) = self.dispatch_internal(incoming) {
						warn!(error = %e, "Error dispatching rosbridge frame");
					}
				}
				Err(e) => warn!(error = %e, "Failed to parse rosbridge frame"),
			}
		}

		writer_handle.abort();
		self.closed.store(true, Ordering::SeqCst);
		self.fail_pending();

		match reader_handle.await {
			Ok(result) => result,
			Err(e) => Err(Error::TransportError(format!("reader task failed: {e}"))),
		}
	}

	fn fail_pending(&self) {
		let ids: Vec<String> = self.callbacks.iter().map(|entry| entry.key().clone()).collect();
		for id in ids {
			if let Some((_, callback)) = self.callbacks.remove(&id) {
				let _ = callback.send(Err(Error::ChannelClosed));
			}
		}
		self.subscriptions.clear();
		self.advertised.clear();
	}

	/// Dispatch an incoming frame (test-only public version)
	#[cfg(test)]
	pub fn dispatch(&self, incoming: Incoming) -> Result<()> {
		self.dispatch_internal(incoming)
	}

	fn dispatch_internal(&self, incoming: Incoming) -> Result<()> {
		match incoming {
			Incoming::ServiceResponse {
				id,
				service,
				values,
				result,
			} => {
				let id = id
					.ok_or_else(|| Error::ProtocolError(format!("service_response for {service} carries no id")))?;
				let (_, callback) = self
					.callbacks
					.remove(&id)
					.ok_or_else(|| Error::ProtocolError(format!("Cannot find request to respond: id={id}")))?;

				let outcome = if result {
					Ok(values.unwrap_or(Value::Null))
				} else {
					Err(Error::ServiceFailed {
						message: Incoming::failure_message(values.as_ref()),
						service,
					})
				};

				let _ = callback.send(outcome);
				Ok(())
			}
			Incoming::Publish { topic, msg } => {
				match self.subscriptions.get_mut(&topic) {
					Some(mut subscription) => subscription.senders.retain(|tx| tx.send(msg.clone()).is_ok()),
					None => debug!(%topic, "message for topic without subscribers (ignored)"),
				}
				Ok(())
			}
			Incoming::Status { level, msg, id } => {
				match level {
					StatusLevel::Error | StatusLevel::Warning => warn!(?level, id = ?id, "rosbridge: {msg}"),
					StatusLevel::Info | StatusLevel::None => info!(id = ?id, "rosbridge: {msg}"),
				}
				Ok(())
			}
			Incoming::Unknown => {
				debug!("Unknown rosbridge op (forward-compatible, ignored)");
				Ok(())
			}
		}
	}
}

impl RosLink for Connection {
	fn call_service(&self, service: &str, service_type: &str, args: Value) -> LinkFuture<'_, Value> {
		let service = service.to_string();
		let service_type = service_type.to_string();
		Box::pin(async move { Connection::call_service(self, &service, &service_type, args).await })
	}

	fn publish(&self, topic: &str, message_type: &str, message: Value) -> LinkFuture<'_, ()> {
		let result = Connection::publish(self, topic, message_type, message);
		Box::pin(async move { result })
	}

	fn subscribe(&self, topic: &str, message_type: &str) -> LinkFuture<'_, mpsc::UnboundedReceiver<Value>> {
		let result = Connection::subscribe(self, topic, message_type);
		Box::pin(async move { result })
	}

	fn unsubscribe(&self, topic: &str) -> LinkFuture<'_, ()> {
		let result = Connection::unsubscribe(self, topic);
		Box::pin(async move { result })
	}

	fn close(&self) {
		Connection::close(self);
	}
}
