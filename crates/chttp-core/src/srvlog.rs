//! Leveled stderr diagnostics for the server processes.
//!
//! Diagnostics go to stderr so they never interleave with the periodic
//! statistics snapshot on stdout or with the access log. Every line
//! carries a `[LEVEL] [pid:role]` prefix; the role ("master", "w3",
//! "w3:t1") is set thread-locally by the runtime.
//!
//! # Environment Variables
//!
//! - `CHTTPD_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `CHTTPD_FLUSH=1` - flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! use chttp_core::{srv_info, srv_error};
//!
//! srv_info!("listening on port {}", port);
//! srv_error!("bind failed: {}", err);
//! ```

use crate::env::env_get_bool;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize from environment variables.
///
/// Called automatically on first log; call explicitly (e.g. from main)
/// for deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    FLUSH_ENABLED.store(env_get_bool("CHTTPD_FLUSH", false), Ordering::Relaxed);

    if let Ok(val) = std::env::var("CHTTPD_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically.
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

thread_local! {
    static ROLE: std::cell::RefCell<Option<String>> = const { std::cell::RefCell::new(None) };
}

/// Set the role tag for this thread ("master", "w3", "w3:t1").
pub fn set_role(role: &str) {
    ROLE.with(|r| *r.borrow_mut() = Some(role.to_string()));
}

fn format_context() -> String {
    let role = ROLE.with(|r| r.borrow().clone()).unwrap_or_else(|| "-".to_string());
    format!("[{}:{}]", std::process::id(), role)
}

/// Internal: leveled line with context.
#[doc(hidden)]
pub fn _slog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    let _ = write!(handle, "{} {} ", level.prefix(), format_context());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");

    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Error level log with context
#[macro_export]
macro_rules! srv_error {
    ($($arg:tt)*) => {{
        $crate::srvlog::_slog_impl(
            $crate::srvlog::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log with context
#[macro_export]
macro_rules! srv_warn {
    ($($arg:tt)*) => {{
        $crate::srvlog::_slog_impl(
            $crate::srvlog::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log with context
#[macro_export]
macro_rules! srv_info {
    ($($arg:tt)*) => {{
        $crate::srvlog::_slog_impl(
            $crate::srvlog::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log with context
#[macro_export]
macro_rules! srv_debug {
    ($($arg:tt)*) => {{
        $crate::srvlog::_slog_impl(
            $crate::srvlog::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log with context
#[macro_export]
macro_rules! srv_trace {
    ($($arg:tt)*) => {{
        $crate::srvlog::_slog_impl(
            $crate::srvlog::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_order() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(1), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_set_level() {
        let prev = log_level();
        set_log_level(LogLevel::Debug);
        assert!(level_enabled(LogLevel::Debug));
        assert!(!level_enabled(LogLevel::Trace));
        set_log_level(prev);
    }
}
