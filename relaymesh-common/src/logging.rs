//! Process-wide tracing setup
//!
//! Mirrors the formatter every role binary shares: a compact layer with
//! microsecond timestamps, file/line shown only in debug builds, and a level
//! driven by `LOG_LEVEL` (falling back to `TRACE` in debug / `INFO` in
//! release). Only events whose target starts with `relaymesh` pass the
//! filter, so dependency crates don't flood the log at `TRACE`.

use chrono::Utc;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::FormatTime, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

struct MicrosecondTime;

impl FormatTime for MicrosecondTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        w.write_fmt(format_args!("{}", Utc::now().timestamp_micros()))
    }
}

pub fn init() {
    let level = match std::env::var("LOG_LEVEL") {
        Ok(level) => match level.to_ascii_lowercase().as_str() {
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            _ => LevelFilter::ERROR,
        },
        Err(_) if cfg!(debug_assertions) => LevelFilter::TRACE,
        Err(_) => LevelFilter::INFO,
    };

    tracing_subscriber::Registry::default()
        .with(
            (if cfg!(debug_assertions) {
                tracing_subscriber::fmt::layer()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
            })
            .compact()
            .with_ansi(true)
            .with_timer(MicrosecondTime)
            .with_target(false)
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| {
                metadata.target().starts_with("relaymesh")
            })),
        )
        .init();
}
