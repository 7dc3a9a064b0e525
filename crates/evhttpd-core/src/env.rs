//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing configuration from the environment
//! with a default.
//!
//! # Usage
//!
//! ```ignore
//! use evhttpd_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("EVHTTPD_WORKERS", 8);
//! let root: String = env_get("EVHTTPD_DOC_ROOT", "./webroot".to_string());
//! let flush: bool = env_get_bool("EVHTTPD_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or the default when the
/// variable is unset or fails to parse.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable as a boolean.
///
/// "1", "true", "yes", "on" (case-insensitive) count as true; any other
/// set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get an environment variable as `Some(T)` when set and parseable,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
