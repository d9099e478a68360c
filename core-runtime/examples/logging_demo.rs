//! Logging system demonstration
//!
//! Emits the kind of events a sync pass produces, in the chosen format.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # With custom filter
//! cargo run --example logging_demo -- compact "logging_demo=trace"
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::env;
use tracing::{debug, error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config)?;

    let event_bus = EventBus::new(16);
    let mut events = event_bus.subscribe();

    info!(api_key = %redact_if_sensitive("api_key", "k-123"), "Configured catalog provider");
    simulated_pass(&event_bus, "asset").await;

    while let Ok(CoreEvent::Sync(event)) = events.try_recv() {
        debug!(?event, "Observed sync event");
    }

    Ok(())
}

#[instrument(skip(event_bus))]
async fn simulated_pass(event_bus: &EventBus, content_type: &str) {
    info!("Starting incremental sync");
    event_bus
        .emit(CoreEvent::Sync(SyncEvent::Started {
            content_type: content_type.to_string(),
            since: 1_717_200_000,
            pass_start: 1_717_286_400,
        }))
        .ok();

    warn!(
        external_id = "asset-42",
        parent_id = "show-missing",
        "Parent has no local record, dropping item"
    );
    error!(
        external_id = "asset-43",
        error = "Parent tree has no 'show' entry",
        "Could not resolve parent tree, skipping item"
    );

    event_bus
        .emit(CoreEvent::Sync(SyncEvent::Completed {
            content_type: content_type.to_string(),
            items_enqueued: 12,
            items_failed: 1,
            cursor: 1_717_286_400,
            duration_secs: 3,
        }))
        .ok();
    info!(items_enqueued = 12, "Incremental sync completed");
}
