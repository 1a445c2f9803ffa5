//! Channel adapters: one publisher per external destination behind a
//! uniform contract.
//!
//! Publishers are side-effect free beyond the remote call; appending the
//! activity record is the caller's job, which keeps every adapter testable
//! in isolation.

mod devto;
mod hashnode;
mod linkedin;
mod twitter;

pub use devto::DevtoPublisher;
pub use hashnode::HashnodePublisher;
pub use linkedin::LinkedinPublisher;
pub use twitter::TwitterPublisher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ChannelsSettings;
use crate::domain::entities::ContentItem;
use crate::domain::types::Channel;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Missing or rejected credential. Distinct so callers can, in
    /// principle, skip retrying; current policy retries anyway.
    #[error("channel credential missing or rejected: {0}")]
    Auth(String),
    #[error("remote returned status {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("malformed remote response: {0}")]
    Malformed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Unsupported(&'static str),
}

impl ChannelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChannelError::Network(_) => true,
            ChannelError::Remote { status, .. } => *status >= 500 || *status == 429,
            ChannelError::Auth(_) | ChannelError::Malformed(_) | ChannelError::Unsupported(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        ChannelError::Network(err.to_string())
    }
}

/// What a successful publish hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Id assigned by the remote channel.
    pub external_id: String,
    pub url: Option<String>,
}

/// What is being pushed out: a full authored post or a short broadcast
/// message (scheduled social jobs carry the latter).
#[derive(Debug, Clone, Copy)]
pub enum Outbound<'a> {
    Post(&'a ContentItem),
    Message {
        text: &'a str,
        media_url: Option<&'a str>,
    },
}

/// Uniform "publish one item to one channel" contract.
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    fn channel(&self) -> Channel;

    async fn publish(
        &self,
        outbound: Outbound<'_>,
        settings: &serde_json::Value,
    ) -> Result<PublishReceipt, ChannelError>;
}

/// Lookup table from channel name to its configured publisher.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    publishers: HashMap<Channel, Arc<dyn ChannelPublisher>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from typed channel settings. Unconfigured channels
    /// still get a publisher so dispatch fails fast with `ChannelError::Auth`
    /// instead of silently skipping.
    pub fn from_settings(settings: &ChannelsSettings) -> Result<Self, ChannelError> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("diramo/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        let mut registry = Self::new();
        registry.register(Arc::new(HashnodePublisher::new(
            client.clone(),
            settings.hashnode.clone(),
        )));
        registry.register(Arc::new(DevtoPublisher::new(
            client.clone(),
            settings.devto.clone(),
        )));
        registry.register(Arc::new(TwitterPublisher::new(
            client.clone(),
            settings.twitter.clone(),
        )));
        registry.register(Arc::new(LinkedinPublisher::new(
            client,
            settings.linkedin.clone(),
        )));
        Ok(registry)
    }

    pub fn register(&mut self, publisher: Arc<dyn ChannelPublisher>) {
        self.publishers.insert(publisher.channel(), publisher);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelPublisher>> {
        self.publishers.get(&channel).cloned()
    }
}

/// Shared helper: convert a non-success response into the channel taxonomy.
pub(crate) async fn remote_failure(response: reqwest::Response) -> ChannelError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return ChannelError::Auth(format!("remote rejected credential ({status}): {message}"));
    }
    ChannelError::Remote {
        status: status.as_u16(),
        message,
    }
}
