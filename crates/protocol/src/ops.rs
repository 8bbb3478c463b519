//! rosbridge v2 operations.
//!
//! Every frame on the wire is a JSON object tagged by its `op` field. The
//! orchestrator sends [`Op`] values and receives [`Incoming`] values:
//!
//! 1. [`Op::CallService`] is answered by [`Incoming::ServiceResponse`] carrying the same `id`
//! 2. [`Op::Subscribe`] causes the bridge to forward [`Incoming::Publish`] frames for the topic
//! 3. [`Op::Advertise`] must precede the first [`Op::Publish`] on a topic
//! 4. The bridge reports problems with individual operations via [`Incoming::Status`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operation sent from the orchestrator to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
	/// Invoke a ROS service.
	CallService {
		/// Correlation id echoed back in the response.
		id: String,
		/// Fully qualified service name, e.g. `/data_collector/start`.
		service: String,
		/// Service type, e.g. `std_srvs/Trigger`.
		#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
		service_type: Option<String>,
		/// Request fields.
		args: Value,
	},
	/// Declare that this client will publish on a topic.
	Advertise {
		id: String,
		topic: String,
		/// Message type, e.g. `actionlib_msgs/GoalID`.
		#[serde(rename = "type")]
		message_type: String,
	},
	/// Publish one message on an advertised topic.
	Publish {
		topic: String,
		msg: Value,
	},
	/// Ask the bridge to forward messages published on a topic.
	Subscribe {
		id: String,
		topic: String,
		#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
		message_type: Option<String>,
	},
	/// Stop forwarding a topic previously subscribed with the same `id`.
	Unsubscribe {
		id: String,
		topic: String,
	},
}

/// Frame received from the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Incoming {
	/// Answer to an [`Op::CallService`].
	ServiceResponse {
		/// Correlation id of the originating call (absent if the call had none).
		#[serde(default)]
		id: Option<String>,
		#[serde(default)]
		service: String,
		/// Response fields on success, or an error message string when `result` is false.
		#[serde(default)]
		values: Option<Value>,
		/// Whether the bridge managed to execute the call at all.
		#[serde(default = "bridge_result_default")]
		result: bool,
	},
	/// A message on a subscribed topic.
	Publish {
		topic: String,
		#[serde(default)]
		msg: Value,
	},
	/// Diagnostic emitted by the bridge.
	Status {
		#[serde(default)]
		level: StatusLevel,
		#[serde(default)]
		msg: String,
		#[serde(default)]
		id: Option<String>,
	},
	/// Any other operation (forward-compatible catch-all).
	#[serde(other)]
	Unknown,
}

// Bridges predating the `result` field only ever answered successful calls.
fn bridge_result_default() -> bool {
	true
}

/// Severity of a bridge [`Incoming::Status`] frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
	Info,
	#[default]
	Warning,
	Error,
	None,
}

impl Incoming {
	/// Extracts the human readable failure text from a failed service response.
	///
	/// rosbridge puts the exception message directly in `values` when
	/// `result` is false.
	pub fn failure_message(values: Option<&Value>) -> String {
		match values {
			Some(Value::String(message)) => message.clone(),
			Some(Value::Null) | None => "service call failed".to_string(),
			Some(other) => other.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn call_service_serializes_with_op_tag_and_type_field() {
		let op = Op::CallService {
			id: "call_service:/data_collector/start:0".into(),
			service: "/data_collector/start".into(),
			service_type: Some("robotslam_data_collection/Start".into()),
			args: json!({"name": "exploration"}),
		};
		let value = serde_json::to_value(&op).unwrap();
		assert_eq!(value["op"], "call_service");
		assert_eq!(value["type"], "robotslam_data_collection/Start");
		assert_eq!(value["args"]["name"], "exploration");
	}

	#[test]
	fn subscribe_omits_missing_type() {
		let op = Op::Subscribe {
			id: "subscribe:/wifi:1".into(),
			topic: "/wifi".into(),
			message_type: None,
		};
		let value = serde_json::to_value(&op).unwrap();
		assert_eq!(value["op"], "subscribe");
		assert!(value.get("type").is_none());
	}

	#[test]
	fn service_response_parses_failed_call() {
		let frame = json!({
			"op": "service_response",
			"id": "call_service:/x:3",
			"service": "/x",
			"values": "Service /x does not exist",
			"result": false
		});
		let incoming: Incoming = serde_json::from_value(frame).unwrap();
		match incoming {
			Incoming::ServiceResponse { id, result, values, .. } => {
				assert_eq!(id.as_deref(), Some("call_service:/x:3"));
				assert!(!result);
				assert_eq!(Incoming::failure_message(values.as_ref()), "Service /x does not exist");
			}
			other => panic!("expected service response, got {other:?}"),
		}
	}

	#[test]
	fn service_response_without_result_field_counts_as_success() {
		let frame = json!({"op": "service_response", "id": "a", "service": "/y", "values": {}});
		let incoming: Incoming = serde_json::from_value(frame).unwrap();
		assert!(matches!(incoming, Incoming::ServiceResponse { result: true, .. }));
	}

	#[test]
	fn unknown_op_is_tolerated() {
		let frame = json!({"op": "png", "data": "..."});
		let incoming: Incoming = serde_json::from_value(frame).unwrap();
		assert_eq!(incoming, Incoming::Unknown);
	}

	#[test]
	fn status_defaults_to_warning_level() {
		let incoming: Incoming = serde_json::from_value(json!({"op": "status", "msg": "queue full"})).unwrap();
		match incoming {
			Incoming::Status { level, msg, .. } => {
				assert_eq!(level, StatusLevel::Warning);
				assert_eq!(msg, "queue full");
			}
			other => panic!("expected status, got {other:?}"),
		}
	}
}
