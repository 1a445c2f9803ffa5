//! LinkedIn share adapter (ugcPosts API).

use async_trait::async_trait;
use serde_json::json;

use crate::config::LinkedinSettings;
use crate::domain::types::Channel;

use super::{ChannelError, ChannelPublisher, Outbound, PublishReceipt, remote_failure};

const UGC_POSTS_ENDPOINT: &str = "https://api.linkedin.com/v2/ugcPosts";

pub struct LinkedinPublisher {
    client: reqwest::Client,
    settings: Option<LinkedinSettings>,
    endpoint: String,
}

impl LinkedinPublisher {
    pub fn new(client: reqwest::Client, settings: Option<LinkedinSettings>) -> Self {
        Self {
            client,
            settings,
            endpoint: UGC_POSTS_ENDPOINT.to_string(),
        }
    }

    /// Point the adapter at a different endpoint. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChannelPublisher for LinkedinPublisher {
    fn channel(&self) -> Channel {
        Channel::Linkedin
    }

    async fn publish(
        &self,
        outbound: Outbound<'_>,
        settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        let creds = self.settings.as_ref().ok_or_else(|| {
            ChannelError::Auth("linkedin access token not configured".to_string())
        })?;

        let commentary = match outbound {
            Outbound::Post(content) => {
                let link = settings.get("canonical_url").and_then(|v| v.as_str());
                match link {
                    Some(link) => format!("{}\n{}", content.title, link),
                    None => content.title.clone(),
                }
            }
            Outbound::Message { text, .. } => text.to_string(),
        };

        let body = json!({
            "author": creds.author_urn,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": commentary },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&creds.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        // The share id comes back in the X-RestLi-Id header; some responses
        // also carry it in the body.
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let external_id = match header_id {
            Some(id) => id,
            None => {
                let payload: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|err| ChannelError::Malformed(err.to_string()))?;
                payload["id"]
                    .as_str()
                    .ok_or_else(|| ChannelError::Malformed("share response missing id".into()))?
                    .to_string()
            }
        };

        Ok(PublishReceipt {
            external_id,
            url: None,
        })
    }
}
