use std::str::FromStr;

use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Mail leaving the system: bulk sends, verification mail
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outbound", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outbound!(level = DEBUG, $($msg)*)
    };
}

/// Delivery feedback arriving from the provider
#[macro_export]
macro_rules! inbound {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "inbound", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::inbound!(level = DEBUG, $($msg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

const fn default_json() -> bool {
    false
}

/// Log output settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Level filter (`trace`, `debug`, `info`, `warn`, `error`).
    ///
    /// `LOG_LEVEL` in the environment takes precedence.
    #[serde(default)]
    pub level: Option<String>,

    /// Emit one JSON object per event instead of compact text
    #[serde(default = "default_json")]
    pub json: bool,
}

fn level_filter(config: &LoggingConfig) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| config.level.clone())
        .map_or(default, |level| {
            LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
                eprintln!("Invalid log level specified {level}, defaulting to {default}");
                default
            })
        })
}

pub fn init(config: &LoggingConfig) {
    let level = level_filter(config);
    let targets = FilterFn::new(|metadata| metadata.target().starts_with("missive"));

    let layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    let layer = if config.json {
        layer.json().with_filter(level).with_filter(targets).boxed()
    } else {
        layer
            .compact()
            .with_ansi(true)
            .with_filter(level)
            .with_filter(targets)
            .boxed()
    };

    tracing_subscriber::Registry::default().with(layer).init();
}
