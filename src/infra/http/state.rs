use std::sync::Arc;

use crate::application::processor::QueueProcessor;
use crate::application::repos::{ActivityRepo, QueueRepo};
use crate::application::runner::BroadcastRunner;
use crate::application::sync::SyncController;

#[derive(Clone)]
pub struct HttpState {
    pub queue: Arc<dyn QueueRepo>,
    pub activity: Arc<dyn ActivityRepo>,
    pub processor: Arc<QueueProcessor>,
    pub runner: Arc<BroadcastRunner>,
    pub sync: Arc<SyncController>,
    pub cron_secret: Option<String>,
}
