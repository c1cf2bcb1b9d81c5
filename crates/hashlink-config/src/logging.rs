//! Structured logging utilities for hashlink components.
//!
//! Every event carries a `component` field (`SHRINK`, `WALK`, `CLI`) next to
//! its structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use hashlink_config::logging::*;
//!
//! log_shrink_info!("Pass finished", processed_files = 1234);
//! log_cli_debug!("Resolved store", root = tracing::field::display(store.display()));
//! ```

use serde::{Deserialize, Serialize};

/// Console verbosity of the tool.
///
/// Ordered from quietest to noisiest. `None` is also the only level at
/// which the live progress block is drawn.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    None,
    Error,
    #[default]
    Warning,
    Message,
    Verbose,
    Debug,
}

impl Verbosity {
    const ORDER: [Verbosity; 6] = [
        Verbosity::None,
        Verbosity::Error,
        Verbosity::Warning,
        Verbosity::Message,
        Verbosity::Verbose,
        Verbosity::Debug,
    ];

    /// `tracing` filter directive for this level
    pub fn filter(self) -> &'static str {
        match self {
            Verbosity::None => "off",
            Verbosity::Error => "error",
            Verbosity::Warning => "warn",
            Verbosity::Message => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Debug => "trace",
        }
    }

    /// Shift by `delta` steps, saturating at both ends.
    pub fn shift(self, delta: i32) -> Verbosity {
        let idx = Self::ORDER.iter().position(|v| *v == self).unwrap_or(2) as i32;
        let max = Self::ORDER.len() as i32 - 1;
        Self::ORDER[(idx + delta).clamp(0, max) as usize]
    }

    /// Whether the live progress block should be drawn at this level
    pub fn shows_progress(self) -> bool {
        self == Verbosity::None
    }
}

// === SHRINK logging macros ===

#[macro_export]
macro_rules! log_shrink_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SHRINK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shrink_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SHRINK", $($key = $value,)* $msg)
    };
}

// === WALK logging macros ===

#[macro_export]
macro_rules! log_walk_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "WALK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_walk_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "WALK", $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Environment variable that overrides the verbosity-derived filter
pub const ENV_LOG: &str = "HASHLINK_LOG";

/// Initialize logging for the given verbosity.
/// Call this once at application startup.
pub fn init_logging(verbosity: Verbosity) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
