//! Twitter/X post adapter.

use async_trait::async_trait;
use serde_json::json;

use crate::config::TwitterSettings;
use crate::domain::entities::ContentItem;
use crate::domain::types::Channel;

use super::{ChannelError, ChannelPublisher, Outbound, PublishReceipt, remote_failure};

const TWEETS_ENDPOINT: &str = "https://api.twitter.com/2/tweets";
const MAX_TWEET_CHARS: usize = 280;

pub struct TwitterPublisher {
    client: reqwest::Client,
    settings: Option<TwitterSettings>,
    endpoint: String,
}

impl TwitterPublisher {
    pub fn new(client: reqwest::Client, settings: Option<TwitterSettings>) -> Self {
        Self {
            client,
            settings,
            endpoint: TWEETS_ENDPOINT.to_string(),
        }
    }

    /// Point the adapter at a different endpoint. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn compose_post_text(content: &ContentItem, settings: &serde_json::Value) -> String {
        let link = settings.get("canonical_url").and_then(|v| v.as_str());
        let mut text = match link {
            Some(link) => format!("{}\n{}", content.title, link),
            None => content.title.clone(),
        };
        if text.chars().count() > MAX_TWEET_CHARS {
            text = text.chars().take(MAX_TWEET_CHARS - 1).collect::<String>() + "…";
        }
        text
    }
}

#[async_trait]
impl ChannelPublisher for TwitterPublisher {
    fn channel(&self) -> Channel {
        Channel::Twitter
    }

    async fn publish(
        &self,
        outbound: Outbound<'_>,
        settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        let creds = self
            .settings
            .as_ref()
            .ok_or_else(|| ChannelError::Auth("twitter bearer token not configured".to_string()))?;

        let text = match outbound {
            Outbound::Post(content) => Self::compose_post_text(content, settings),
            Outbound::Message { text, .. } => text.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&creds.bearer_token)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ChannelError::Malformed(err.to_string()))?;

        let external_id = payload["data"]["id"]
            .as_str()
            .ok_or_else(|| ChannelError::Malformed("tweet response missing data.id".into()))?
            .to_string();

        Ok(PublishReceipt {
            external_id,
            url: None,
        })
    }
}
