//! Secret wrapper for API keys and other sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Placeholder printed instead of the wrapped value.
pub const REDACTED: &str = "[REDACTED]";

/// Sensitive value - redacted in Debug/Display/logs, wiped on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the raw value. Only the outbound `Authorization` header
    /// should need this.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True when the wrapped string has no characters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted_in_debug_and_display() {
        let key = Secret::new(String::from("sk-or-v1-abc"));
        assert_eq!(format!("{key:?}"), "[REDACTED]");
        assert_eq!(format!("{key}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_raw_value() {
        let key: Secret<String> = String::from("sk-or-v1-abc").into();
        assert_eq!(key.expose(), "sk-or-v1-abc");
    }

    #[test]
    fn is_empty_reflects_inner_string() {
        assert!(Secret::new(String::new()).is_empty());
        assert!(!Secret::new(String::from("k")).is_empty());
    }

    #[test]
    fn redaction_survives_containers() {
        let keys = vec![Secret::new(String::from("k1")), Secret::new(String::from("k2"))];
        let debug = format!("{keys:?}");
        assert!(!debug.contains("k1"));
        assert_eq!(debug, "[[REDACTED], [REDACTED]]");
    }
}
