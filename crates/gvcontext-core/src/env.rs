//! Environment variable utilities
//!
//! Typed readers for the `GVC_*` override variables.
//!
//! # Usage
//!
//! ```ignore
//! use gvcontext_core::env::{env_get, env_get_bool, env_get_size};
//!
//! let align: usize = env_get("GVC_STACK_ALIGN", 16);
//! let guard = env_get_bool("GVC_GUARD_PAGE", false);
//! let stack = env_get_size("GVC_STACK_SIZE", 256 * 1024); // accepts "256K", "8M"
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset variables and values that fail to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as a byte size
///
/// Plain numbers are bytes; `K`, `M` and `G` suffixes (case-insensitive,
/// optional trailing `B`) scale by 1024.
pub fn env_get_size(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_size(&v))
        .unwrap_or(default)
}

/// Parse a size string such as `"4096"`, `"64K"`, `"8MB"`.
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim().to_ascii_uppercase();
    let s = s.strip_suffix('B').unwrap_or(&s);
    let (digits, shift) = match s.chars().last()? {
        'K' => (&s[..s.len() - 1], 10),
        'M' => (&s[..s.len() - 1], 20),
        'G' => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(1usize << shift)
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__GVC_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_bool_default() {
        assert!(env_get_bool("__GVC_TEST_UNSET_VAR__", true));
        assert!(!env_get_bool("__GVC_TEST_UNSET_VAR__", false));
    }

    #[test]
    fn test_env_get_str_default() {
        assert_eq!(env_get_str("__GVC_TEST_UNSET_VAR__", "abort"), "abort");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64K"), Some(64 * 1024));
        assert_eq!(parse_size("64kb"), Some(64 * 1024));
        assert_eq!(parse_size(" 8M "), Some(8 * 1024 * 1024));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size("twelve"), None);
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__GVC_TEST_ALIGN__", "32");
        let val: usize = env_get("__GVC_TEST_ALIGN__", 16);
        assert_eq!(val, 32);
        std::env::remove_var("__GVC_TEST_ALIGN__");
    }

    #[test]
    fn test_env_get_size_set_and_invalid() {
        std::env::set_var("__GVC_TEST_SIZE__", "128K");
        assert_eq!(env_get_size("__GVC_TEST_SIZE__", 1), 128 * 1024);

        std::env::set_var("__GVC_TEST_SIZE__", "lots");
        assert_eq!(env_get_size("__GVC_TEST_SIZE__", 7), 7);
        std::env::remove_var("__GVC_TEST_SIZE__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        std::env::set_var("__GVC_TEST_BOOL__", "TRUE");
        assert!(env_get_bool("__GVC_TEST_BOOL__", false));

        std::env::set_var("__GVC_TEST_BOOL__", "on");
        assert!(env_get_bool("__GVC_TEST_BOOL__", false));

        std::env::set_var("__GVC_TEST_BOOL__", "0");
        assert!(!env_get_bool("__GVC_TEST_BOOL__", true));

        std::env::set_var("__GVC_TEST_BOOL__", "garbage");
        assert!(!env_get_bool("__GVC_TEST_BOOL__", true));

        std::env::remove_var("__GVC_TEST_BOOL__");
    }
}
