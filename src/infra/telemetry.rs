use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "productguard_cache_hit_total",
            Unit::Count,
            "Total number of lookups served from a populated cache entry."
        );
        describe_counter!(
            "productguard_cache_miss_total",
            Unit::Count,
            "Total number of lookups that found no cache entry."
        );
        describe_counter!(
            "productguard_tombstone_hit_total",
            Unit::Count,
            "Total number of lookups answered not-found from a tombstone."
        );
        describe_counter!(
            "productguard_record_read_total",
            Unit::Count,
            "Total number of record store reads issued by the guard."
        );
        describe_counter!(
            "productguard_lock_wait_total",
            Unit::Count,
            "Total number of fill locks acquired after contention."
        );
        describe_counter!(
            "productguard_lock_abandoned_total",
            Unit::Count,
            "Total number of fill locks left to expire after failed releases."
        );
        describe_counter!(
            "productguard_lock_fallback_total",
            Unit::Count,
            "Total number of fills performed without the lock."
        );
        describe_counter!(
            "productguard_cache_write_failed_total",
            Unit::Count,
            "Total number of best-effort cache writes that failed."
        );
        describe_histogram!(
            "productguard_fill_ms",
            Unit::Milliseconds,
            "Record store read plus cache write latency in milliseconds."
        );
    });
}
