//! Tracing initialization.
//!
//! Called once at startup by whatever binary embeds the dispatcher. The
//! `LOG_LEVEL` environment variable overrides the compiled-in default.

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::FilterFn, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

pub fn init() {
    let level = std::env::var("LOG_LEVEL").map_or(
        if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        },
        |level| match level.to_ascii_lowercase().as_str() {
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::ERROR,
        },
    );

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    cfg!(debug_assertions) || metadata.target().starts_with("campaigner")
                })),
        )
        .init();
}
