//! Logging setup for a cache host
//!
//! Emits the kind of events the media cache produces so the output formats
//! can be compared side by side.
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "core_cache=trace"
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_uri, strip_path, LogFormat, LoggingConfig};
use std::env;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

#[core_async::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_spans(true)
        .with_target(true);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(err) = init_logging(config) {
        eprintln!("logging setup failed: {err}");
        return;
    }

    info!(format = ?format, "Logging initialized");

    materialize("clip-42", "https://cdn.example.com/v/clip-42_720.mp4?sig=abc&exp=1")
        .instrument(info_span!("materialize", key = "clip-42"))
        .await;
    eviction_sweep().await;
}

async fn materialize(key: &str, uri: &str) {
    debug!(key, "Cache miss");
    info!(uri = %redact_uri(uri), quality = "high", "Downloading variant");
    core_async::sleep(core_async::Duration::from_millis(10)).await;
    info!(
        file = %strip_path("/home/jane/.cache/media/full/0a1b2c3d4e5f6a7b.mp4"),
        size_bytes = 4_194_304u64,
        "Cached"
    );
}

#[instrument(name = "eviction")]
async fn eviction_sweep() {
    warn!(current_bytes = 11_534_336u64, max_bytes = 10_485_760u64, "Over budget");
    for (key, score) in [("clip-7", 0.12), ("clip-19", 0.31)] {
        debug!(key, score, "Evicting entry");
        core_async::task::yield_now().await;
    }
    info!(entries_evicted = 2, bytes_freed = 8_388_608u64, "Eviction finished");
}
