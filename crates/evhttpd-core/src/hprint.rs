//! Leveled stderr logging macros
//!
//! Thread-safe, optionally-flushing diagnostic output. No logger
//! framework: a locked stderr handle and an atomic level cache are all a
//! single-purpose server needs.
//!
//! # Environment Variables
//!
//! - `EVHTTPD_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info,
//!   4=debug, 5=trace (names accepted too)
//! - `EVHTTPD_FLUSH_EPRINT=1` - Flush stderr after each line (useful when
//!   chasing a crash)
//!
//! # Usage
//!
//! ```ignore
//! use evhttpd_core::{hdebug, herror, hinfo, hwarn};
//!
//! hinfo!("listening on port {}", port);
//! hwarn!("worker queue full, shedding fd {}", fd);
//! herror!("epoll wait failed: {}", err);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, highest severity first.
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

/// Initialize logging from the environment.
///
/// Called automatically on first use; call explicitly for deterministic
/// startup ordering.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("EVHTTPD_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("EVHTTPD_LOG_LEVEL") {
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
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the level programmatically (overrides the environment).
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check whether a level would be printed.
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Internal: write one unprefixed line under the stderr lock.
#[doc(hidden)]
pub fn _hprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Internal: write one leveled line under the stderr lock.
#[doc(hidden)]
pub fn _hlog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Print to stderr with newline, unconditionally.
#[macro_export]
macro_rules! hprintln {
    () => {{
        $crate::hprint::_hprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::hprint::_hprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log.
#[macro_export]
macro_rules! herror {
    ($($arg:tt)*) => {{
        $crate::hprint::_hlog_impl($crate::hprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warn level log.
#[macro_export]
macro_rules! hwarn {
    ($($arg:tt)*) => {{
        $crate::hprint::_hlog_impl($crate::hprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log.
#[macro_export]
macro_rules! hinfo {
    ($($arg:tt)*) => {{
        $crate::hprint::_hlog_impl($crate::hprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log.
#[macro_export]
macro_rules! hdebug {
    ($($arg:tt)*) => {{
        $crate::hprint::_hlog_impl($crate::hprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log.
#[macro_export]
macro_rules! htrace {
    ($($arg:tt)*) => {{
        $crate::hprint::_hlog_impl($crate::hprint::LogLevel::Trace, format_args!($($arg)*));
    }};
}
