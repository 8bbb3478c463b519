use std::sync::Arc;

use async_trait::async_trait;
use survey_protocol::GoalId;
use survey_runtime::LinkProvider;
use tracing::info;

use super::live_link;
use crate::collaborators::NavigationClient;
use crate::error::Result;

/// Cancels move_base goals by publishing on its `cancel` topic.
pub struct MoveBaseClient {
	links: Arc<dyn LinkProvider>,
	cancel_topic: String,
}

impl MoveBaseClient {
	pub fn new(links: Arc<dyn LinkProvider>, cancel_topic: &str) -> Self {
		Self {
			links,
			cancel_topic: cancel_topic.to_string(),
		}
	}
}

#[async_trait]
impl NavigationClient for MoveBaseClient {
	async fn stop(&self) -> Result<()> {
		let link = live_link(self.links.as_ref())?;
		let message = serde_json::to_value(GoalId::cancel_all())?;
		link.publish(&self.cancel_topic, GoalId::TYPE, message).await?;
		info!(topic = %self.cancel_topic, "navigation goals cancelled");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::ros::testing::{FakeLink, FakeLinks};

	#[tokio::test]
	async fn test_stop_publishes_cancel_all() {
		let link = FakeLink::new();
		let client = MoveBaseClient::new(FakeLinks::connected(&link), "/move_base/cancel");

		client.stop().await.unwrap();

		let published = link.published.lock().clone();
		assert_eq!(
			published,
			vec![(
				"/move_base/cancel".to_string(),
				"actionlib_msgs/GoalID".to_string(),
				json!({"stamp": {"secs": 0, "nsecs": 0}, "id": ""})
			)]
		);
	}

	#[tokio::test]
	async fn test_stop_without_link_fails() {
		let client = MoveBaseClient::new(FakeLinks::disconnected(), "/move_base/cancel");
		let err = client.stop().await.unwrap_err();
		assert!(matches!(err, crate::Error::Runtime(survey_runtime::Error::NotConnected)));
	}
}
