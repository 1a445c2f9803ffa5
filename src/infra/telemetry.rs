use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "diramo_dispatch_success_total",
            Unit::Count,
            "Total number of successful channel publishes from the queue."
        );
        describe_counter!(
            "diramo_dispatch_failure_total",
            Unit::Count,
            "Total number of failed channel publishes from the queue."
        );
        describe_counter!(
            "diramo_broadcast_success_total",
            Unit::Count,
            "Total number of successful scheduled broadcast deliveries."
        );
        describe_counter!(
            "diramo_broadcast_failure_total",
            Unit::Count,
            "Total number of failed scheduled broadcast deliveries."
        );
        describe_counter!(
            "diramo_webhook_rejected_total",
            Unit::Count,
            "Total number of inbound webhooks rejected for a bad signature."
        );
        describe_gauge!(
            "diramo_queue_pending",
            Unit::Count,
            "Current number of pending distribution requests."
        );
        describe_histogram!(
            "diramo_cron_batch_ms",
            Unit::Milliseconds,
            "Scheduled broadcast batch latency in milliseconds."
        );
    });
}
