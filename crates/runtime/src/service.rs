//! Typed service proxies.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use survey_protocol::{ServiceDefinition, StartCollection, Trigger};
use tracing::debug;

use crate::error::Result;
use crate::link::RosLink;

/// A named remote procedure bound to one live link.
///
/// The proxy does not interpret application-level failure: a response with
/// `success: false` is returned as-is. Only serialization, bridge-level and
/// transport failures surface as `Err`. There is no timeout and no retry.
pub struct ServiceProxy<S: ServiceDefinition> {
	link: Arc<dyn RosLink>,
	name: Arc<str>,
	service_type: Arc<str>,
	_service: PhantomData<fn() -> S>,
}

impl<S: ServiceDefinition> ServiceProxy<S> {
	pub fn new(link: Arc<dyn RosLink>, name: &str, service_type: &str) -> Self {
		Self {
			link,
			name: Arc::from(name),
			service_type: Arc::from(service_type),
			_service: PhantomData,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Calls the service and decodes its response.
	pub async fn call(&self, request: &S::Request) -> Result<S::Response> {
		let args = serde_json::to_value(request)?;
		debug!(service = %self.name, "service proxy call");
		let values = self.link.call_service(&self.name, &self.service_type, args).await?;
		Ok(serde_json::from_value(values)?)
	}
}

impl<S: ServiceDefinition> Clone for ServiceProxy<S> {
	fn clone(&self) -> Self {
		Self {
			link: Arc::clone(&self.link),
			name: Arc::clone(&self.name),
			service_type: Arc::clone(&self.service_type),
			_service: PhantomData,
		}
	}
}

impl<S: ServiceDefinition> fmt::Debug for ServiceProxy<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceProxy")
			.field("name", &self.name)
			.field("service_type", &self.service_type)
			.finish()
	}
}

/// Names and types of the data collection services on the robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionServiceNames {
	pub start: String,
	pub start_type: String,
	pub end: String,
	pub end_type: String,
}

impl Default for CollectionServiceNames {
	fn default() -> Self {
		Self {
			start: "/data_collector/start".to_string(),
			start_type: StartCollection::DEFAULT_TYPE.to_string(),
			end: "/data_collector/end".to_string(),
			end_type: Trigger::DEFAULT_TYPE.to_string(),
		}
	}
}

/// Start/end collection proxies, rebuilt on every (re)connect.
#[derive(Debug, Clone)]
pub struct CollectionServices {
	pub start: ServiceProxy<StartCollection>,
	pub end: ServiceProxy<Trigger>,
}

impl CollectionServices {
	pub fn bind(link: Arc<dyn RosLink>, names: &CollectionServiceNames) -> Self {
		Self {
			start: ServiceProxy::new(Arc::clone(&link), &names.start, &names.start_type),
			end: ServiceProxy::new(link, &names.end, &names.end_type),
		}
	}
}
