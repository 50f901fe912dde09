//! ## Features
//!
//! - Standard logging levels (verbose, debug, info, success, warn, error)
//! - Multi-line message support: every line becomes its own event
//! - Events are emitted through `tracing` on the `bentley` target, so any
//!   subscriber the host process installs receives them
//! - `init()` installs a stderr subscriber filtered by `QUOTES_LOG`
//!
//! ## Usage
//!
//! Call `bentley::init()` once near process start, then log through the
//! macros: `bentley::info!(&format!("embedded {count} quotes"))`.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `EnvFilter` directive
pub const LOG_ENV: &str = "QUOTES_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the stderr subscriber. Returns `false` when a global subscriber
/// was already set (by an earlier call or by the host process).
pub fn init() -> bool {
  let filter =
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init()
    .is_ok()
}

/// Core logging function: one event per line at the given level
pub fn log(level: Level, message: &str) {
  for line in message.lines() {
    match level {
      Level::TRACE => tracing::trace!(target: "bentley", "{line}"),
      Level::DEBUG => tracing::debug!(target: "bentley", "{line}"),
      Level::INFO => tracing::info!(target: "bentley", "{line}"),
      Level::WARN => tracing::warn!(target: "bentley", "{line}"),
      _ => tracing::error!(target: "bentley", "{line}"),
    }
  }
}

/// Verbose logging - chatty diagnostics, off by default
pub fn verbose(message: &str) {
  log(Level::TRACE, message);
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  log(Level::DEBUG, message);
}

/// Info level logging - general information
pub fn info(message: &str) {
  log(Level::INFO, message);
}

/// Success level logging - a unit of work completed
pub fn success(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "bentley", outcome = "success", "{line}");
  }
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  log(Level::WARN, message);
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  log(Level::ERROR, message);
}

/// Macros for coverage-excluded logging - these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg); // LCOV_EXCL_LINE
  };
}
