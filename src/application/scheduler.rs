//! Timer abstraction so polling loops can be driven by a real clock in
//! production and by hand in tests.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::MissedTickBehavior;

pub type PeriodicTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Cancellation handle for one scheduled periodic task.
pub struct ScheduleHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval` until the returned handle is cancelled.
    fn schedule_periodic(&self, interval: Duration, task: PeriodicTask) -> ScheduleHandle;
}

/// Production scheduler backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_periodic(&self, interval: Duration, task: PeriodicTask) -> ScheduleHandle {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task().await;
            }
        });
        ScheduleHandle::new(move || handle.abort())
    }
}
