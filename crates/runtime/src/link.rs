//! Object-safe view of a live rosbridge connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Boxed future returned by [`RosLink`] methods.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait defining what proxies and collaborators need from a connection.
///
/// [`Connection`](crate::Connection) implements this; tests substitute
/// in-memory fakes.
pub trait RosLink: Send + Sync {
	/// Calls a ROS service and resolves with the response `values`.
	fn call_service(&self, service: &str, service_type: &str, args: Value) -> LinkFuture<'_, Value>;

	/// Publishes a message, advertising the topic first if needed.
	fn publish(&self, topic: &str, message_type: &str, message: Value) -> LinkFuture<'_, ()>;

	/// Subscribes to a topic; the stream ends when the link closes or on unsubscribe.
	fn subscribe(&self, topic: &str, message_type: &str) -> LinkFuture<'_, mpsc::UnboundedReceiver<Value>>;

	/// Drops every subscription on `topic`.
	fn unsubscribe(&self, topic: &str) -> LinkFuture<'_, ()>;

	/// Starts closing the underlying socket. Outstanding calls fail.
	fn close(&self);
}

/// Source of the current live link, if any.
pub trait LinkProvider: Send + Sync {
	fn link(&self) -> Option<Arc<dyn RosLink>>;
}
