//! Cross-platform logging.
//!
//! The `log_*!` macros format once and hand the line to [`emit`], which
//! routes it to `web_sys::console` in the browser and to `tracing` on
//! desktop (where `main` installs a `tracing-subscriber`).

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_arch = "wasm32")]
pub fn emit(level: Level, msg: &str) {
    let value = msg.into();
    match level {
        Level::Debug => web_sys::console::debug_1(&value),
        Level::Info => web_sys::console::log_1(&value),
        Level::Warn => web_sys::console::warn_1(&value),
        Level::Error => web_sys::console::error_1(&value),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn emit(level: Level, msg: &str) {
    match level {
        Level::Debug => tracing::debug!("{}", msg),
        Level::Info => tracing::info!("{}", msg),
        Level::Warn => tracing::warn!("{}", msg),
        Level::Error => tracing::error!("{}", msg),
    }
}

/// Install the desktop log subscriber. `RUST_LOG` overrides the default
/// filter.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("frameworks_client=debug"));
    // A second init (tests, hot reload) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init() {}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, &format!($($arg)*))
    };
}
