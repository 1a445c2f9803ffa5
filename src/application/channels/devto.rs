//! Dev.to article adapter.

use async_trait::async_trait;
use serde_json::json;

use crate::config::DevtoSettings;
use crate::domain::types::Channel;

use super::{ChannelError, ChannelPublisher, Outbound, PublishReceipt, remote_failure};

const ARTICLES_ENDPOINT: &str = "https://dev.to/api/articles";

pub struct DevtoPublisher {
    client: reqwest::Client,
    settings: Option<DevtoSettings>,
    endpoint: String,
}

impl DevtoPublisher {
    pub fn new(client: reqwest::Client, settings: Option<DevtoSettings>) -> Self {
        Self {
            client,
            settings,
            endpoint: ARTICLES_ENDPOINT.to_string(),
        }
    }

    /// Point the adapter at a different endpoint. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChannelPublisher for DevtoPublisher {
    fn channel(&self) -> Channel {
        Channel::Devto
    }

    async fn publish(
        &self,
        outbound: Outbound<'_>,
        settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        let creds = self
            .settings
            .as_ref()
            .ok_or_else(|| ChannelError::Auth("dev.to api key not configured".to_string()))?;

        let article = match outbound {
            Outbound::Post(content) => {
                let canonical = settings.get("canonical_url").and_then(|v| v.as_str());
                json!({
                    "article": {
                        "title": content.title,
                        "body_markdown": content.body_markdown,
                        "description": content.excerpt,
                        "published": true,
                        "canonical_url": canonical,
                    }
                })
            }
            Outbound::Message { .. } => {
                return Err(ChannelError::Unsupported(
                    "dev.to accepts full articles only, not broadcast messages",
                ));
            }
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &creds.api_key)
            .json(&article)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ChannelError::Malformed(err.to_string()))?;

        let external_id = payload["id"]
            .as_i64()
            .map(|id| id.to_string())
            .ok_or_else(|| ChannelError::Malformed("article response missing id".into()))?;
        let url = payload["url"].as_str().map(str::to_string);

        Ok(PublishReceipt { external_id, url })
    }
}
