//! In-memory link used by the adapter tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use survey_runtime::{Error, LinkFuture, LinkProvider, RosLink};
use tokio::sync::{mpsc, oneshot};

#[derive(Default)]
pub(crate) struct FakeLink {
	pub published: Mutex<Vec<(String, String, Value)>>,
	pub calls: Mutex<Vec<(String, String)>>,
	pub answers: Mutex<HashMap<String, Value>>,
	/// Local subscribers per topic; every one receives each message.
	pub subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
	pub unsubscribed: Mutex<Vec<String>>,
	/// Holds the next subscribe until the sender fires.
	pub subscribe_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeLink {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn answer(&self, service: &str, values: Value) {
		self.answers.lock().insert(service.to_string(), values);
	}

	/// Delivers `message` to every live subscriber of `topic`; false if none.
	pub fn emit(&self, topic: &str, message: Value) -> bool {
		let mut subscribers = self.subscribers.lock();
		let Some(senders) = subscribers.get_mut(topic) else {
			return false;
		};
		senders.retain(|tx| tx.send(message.clone()).is_ok());
		!senders.is_empty()
	}

	pub fn has_subscriber(&self, topic: &str) -> bool {
		self.subscribers
			.lock()
			.get(topic)
			.is_some_and(|senders| senders.iter().any(|tx| !tx.is_closed()))
	}

	/// Ends every subscription stream, as a dropped connection does.
	pub fn drop_subscribers(&self) {
		self.subscribers.lock().clear();
	}

	/// Makes the next subscribe wait; the returned sender releases it.
	pub fn gate_subscribe(&self) -> oneshot::Sender<()> {
		let (release, gate) = oneshot::channel();
		*self.subscribe_gate.lock() = Some(gate);
		release
	}
}

impl RosLink for FakeLink {
	fn call_service(&self, service: &str, service_type: &str, _args: Value) -> LinkFuture<'_, Value> {
		self.calls.lock().push((service.to_string(), service_type.to_string()));
		let answer = self.answers.lock().get(service).cloned().ok_or_else(|| Error::ServiceFailed {
			service: service.to_string(),
			message: "Service does not exist".to_string(),
		});
		Box::pin(async move { answer })
	}

	fn publish(&self, topic: &str, message_type: &str, message: Value) -> LinkFuture<'_, ()> {
		self.published
			.lock()
			.push((topic.to_string(), message_type.to_string(), message));
		Box::pin(async { Ok(()) })
	}

	fn subscribe(&self, topic: &str, _message_type: &str) -> LinkFuture<'_, mpsc::UnboundedReceiver<Value>> {
		let topic = topic.to_string();
		let gate = self.subscribe_gate.lock().take();
		Box::pin(async move {
			if let Some(gate) = gate {
				let _ = gate.await;
			}
			let (tx, rx) = mpsc::unbounded_channel();
			self.subscribers.lock().entry(topic).or_default().push(tx);
			Ok(rx)
		})
	}

	fn unsubscribe(&self, topic: &str) -> LinkFuture<'_, ()> {
		self.subscribers.lock().remove(topic);
		self.unsubscribed.lock().push(topic.to_string());
		Box::pin(async { Ok(()) })
	}

	fn close(&self) {}
}

/// Link provider whose current link the test can swap.
pub(crate) struct FakeLinks {
	link: Mutex<Option<Arc<dyn RosLink>>>,
}

impl FakeLinks {
	pub fn connected(link: &Arc<FakeLink>) -> Arc<Self> {
		let link: Arc<dyn RosLink> = link.clone();
		Arc::new(Self {
			link: Mutex::new(Some(link)),
		})
	}

	pub fn disconnected() -> Arc<Self> {
		Arc::new(Self { link: Mutex::new(None) })
	}

	pub fn set(&self, link: Option<&Arc<FakeLink>>) {
		*self.link.lock() = link.map(|link| {
			let link: Arc<dyn RosLink> = link.clone();
			link
		});
	}
}

impl LinkProvider for FakeLinks {
	fn link(&self) -> Option<Arc<dyn RosLink>> {
		self.link.lock().clone()
	}
}
