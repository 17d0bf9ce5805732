//! Logging initialization (§0.1): a `tracing-subscriber` filter split across
//! two independent targets, `smartweb_gateway` (this crate) and `broker`
//! (the broker client), driven by the `-d` debug level.

use tracing_subscriber::EnvFilter;

/// Builds the `EnvFilter` directive string for a given debug level,
/// reproducing the original driver's four-way split: `0` leaves both
/// targets at `info`, `±1`/`±2` toggle one target, `±3` toggles both.
/// Any other value is a caller error (the CLI rejects it before this runs).
fn directives_for_level(level: i32) -> String {
    let (gateway, broker) = match level {
        0 => ("info", "info"),
        1 => ("debug", "info"),
        2 => ("info", "debug"),
        3 => ("debug", "debug"),
        -1 => ("warn", "info"),
        -2 => ("info", "warn"),
        -3 => ("warn", "warn"),
        _ => ("info", "info"),
    };
    format!("smartweb_gateway={gateway},broker={broker}")
}

/// Resolves the effective debug level from the CLI flag and the config
/// file's `debug` boolean (§0.6 item 6): a non-zero CLI level always wins;
/// otherwise `config.debug` maps to the "both debug" level, and its
/// absence to the default "both info" level.
pub fn effective_level(cli_level: i32, config_debug: bool) -> i32 {
    if cli_level != 0 {
        cli_level
    } else if config_debug {
        3
    } else {
        0
    }
}

/// Initializes the global `tracing` subscriber. Call exactly once, before
/// any other gateway code runs.
pub fn init(level: i32) {
    let filter = EnvFilter::try_new(directives_for_level(level)).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
