//! Primary blogging platform adapter (Hashnode GraphQL API).

use async_trait::async_trait;
use serde_json::json;

use crate::config::HashnodeSettings;
use crate::domain::types::Channel;

use super::{ChannelError, ChannelPublisher, Outbound, PublishReceipt, remote_failure};

const GQL_ENDPOINT: &str = "https://gql.hashnode.com";

const PUBLISH_MUTATION: &str = r#"
mutation PublishPost($input: PublishPostInput!) {
  publishPost(input: $input) {
    post { id url }
  }
}
"#;

pub struct HashnodePublisher {
    client: reqwest::Client,
    settings: Option<HashnodeSettings>,
    endpoint: String,
}

impl HashnodePublisher {
    pub fn new(client: reqwest::Client, settings: Option<HashnodeSettings>) -> Self {
        Self {
            client,
            settings,
            endpoint: GQL_ENDPOINT.to_string(),
        }
    }

    /// Point the adapter at a different endpoint. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChannelPublisher for HashnodePublisher {
    fn channel(&self) -> Channel {
        Channel::Hashnode
    }

    async fn publish(
        &self,
        outbound: Outbound<'_>,
        _settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError> {
        let creds = self
            .settings
            .as_ref()
            .ok_or_else(|| ChannelError::Auth("hashnode token not configured".to_string()))?;

        let Outbound::Post(content) = outbound else {
            return Err(ChannelError::Unsupported(
                "hashnode accepts full posts only, not broadcast messages",
            ));
        };

        let body = json!({
            "query": PUBLISH_MUTATION,
            "variables": {
                "input": {
                    "publicationId": creds.publication_id,
                    "title": content.title,
                    "contentMarkdown": content.body_markdown,
                    "slug": content.slug,
                }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &creds.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_failure(response).await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ChannelError::Malformed(err.to_string()))?;

        if let Some(errors) = payload.get("errors").and_then(|e| e.as_array())
            && !errors.is_empty()
        {
            let message = errors[0]
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown GraphQL error");
            return Err(ChannelError::Remote {
                status: 200,
                message: message.to_string(),
            });
        }

        let post = &payload["data"]["publishPost"]["post"];
        let external_id = post["id"]
            .as_str()
            .ok_or_else(|| ChannelError::Malformed("publishPost response missing post id".into()))?
            .to_string();
        let url = post["url"].as_str().map(str::to_string);

        Ok(PublishReceipt { external_id, url })
    }
}
