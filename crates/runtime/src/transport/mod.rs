//! WebSocket transport for rosbridge.
//!
//! The transport is split into a writer half ([`Transport`]) and a reader
//! half ([`TransportReceiver`]) so the connection can drive them from
//! separate tasks. The reader forwards every decoded JSON frame into an
//! unbounded channel; a clean close frame ends it with `Ok(())`, a socket
//! error ends it with [`Error::TransportError`].


use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Writer half of a transport.
pub trait Transport: Send {
	/// Serializes and sends one JSON frame.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Starts the closing handshake.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Reader half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the socket closes, forwarding them to the message channel.
	fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Both halves of a transport plus the channel the reader feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// rosbridge transport over any WebSocket stream.
pub struct WebSocketTransport<S> {
	sender: WebSocketTransportSender<S>,
	receiver: WebSocketTransportReceiver<S>,
}

/// Writer half of [`WebSocketTransport`].
pub struct WebSocketTransportSender<S> {
	sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

/// Reader half of [`WebSocketTransport`].
pub struct WebSocketTransportReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
	/// Opens a WebSocket to `url` (e.g. `ws://robot.local:9090`).
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		debug!(url, "opening rosbridge websocket");
		let (stream, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		Ok(Self::from_stream(stream))
	}
}

impl<S> WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Wraps an already established WebSocket.
	pub fn from_stream(stream: WebSocketStream<S>) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sink, stream) = stream.split();
		let transport = Self {
			sender: WebSocketTransportSender { sink },
			receiver: WebSocketTransportReceiver { stream, message_tx },
		};
		(transport, message_rx)
	}

	pub fn into_parts(self) -> (WebSocketTransportSender<S>, WebSocketTransportReceiver<S>) {
		(self.sender, self.receiver)
	}

	/// Boxes both halves for [`Connection::new`](crate::Connection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}
}

impl<S> Transport for WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(WsMessage::Text(text))
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move { self.sink.close().await.map_err(|e| Error::TransportError(e.to_string())) })
	}
}

impl<S> TransportReceiver for WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let frame = frame.map_err(|e| Error::TransportError(e.to_string()))?;
				let decoded = match frame {
					WsMessage::Text(text) => serde_json::from_str::<Value>(&text),
					// rosbridge only uses binary frames for compressed payloads; try JSON anyway
					WsMessage::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					WsMessage::Close(frame) => {
						debug!(?frame, "rosbridge closed the socket");
						return Ok(());
					}
					_ => continue,
				};

				match decoded {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							debug!("message channel dropped, stopping reader");
							return Ok(());
						}
					}
					Err(e) => warn!(error = %e, "skipping frame that is not JSON"),
				}
			}
			Ok(())
		})
	}
}
