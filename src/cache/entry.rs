//! Cache Entry Module
//!
//! The logical shape of a cached item on its way into the store: namespaced
//! key, encoded payload and optional absolute expiry.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

/// Separator between a namespace prefix and the key.
pub const PREFIX_SEPARATOR: char = ':';

// == Time To Live ==
/// Relative lifetime of an entry at the moment it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeToLive {
    /// No expiry
    Persistent,
    /// Expires after this long
    Remaining(Duration),
    /// Expiry is already in the past
    Elapsed,
}

// == Cache Entry ==
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Caller-supplied key
    pub key: String,
    /// Namespace, if any
    pub prefix: Option<String>,
    /// Encoded value
    pub payload: Vec<u8>,
    /// Absolute expiry, None = never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        prefix: Option<String>,
        payload: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: key.into(),
            prefix,
            payload,
            expires_at,
        }
    }

    /// The key as the store sees it.
    pub fn store_key(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{PREFIX_SEPARATOR}{}", self.key),
            None => self.key.clone(),
        }
    }

    // == Time To Live ==
    /// Lifetime relative to `now`, at millisecond precision.
    ///
    /// An expiry less than one millisecond away counts as elapsed.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> TimeToLive {
        match self.expires_at {
            None => TimeToLive::Persistent,
            Some(at) => {
                let remaining = (at - now).num_milliseconds();
                if remaining <= 0 {
                    TimeToLive::Elapsed
                } else {
                    TimeToLive::Remaining(Duration::from_millis(remaining as u64))
                }
            }
        }
    }

    pub fn ttl(&self) -> TimeToLive {
        self.ttl_at(Utc::now())
    }
}

// == Key Helpers ==
/// Rejects empty keys.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::Usage("key must not be empty".to_string()));
    }
    Ok(())
}

/// Rejects empty or whitespace-only prefixes.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.trim().is_empty() {
        return Err(CacheError::Usage("key prefix is not specified".to_string()));
    }
    Ok(())
}

/// Builds `prefix:key`, or just `key` without a prefix.
pub fn namespaced_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{PREFIX_SEPARATOR}{key}"),
        None => key.to_string(),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_store_key_with_and_without_prefix() {
        let plain = CacheEntry::new("user:42", None, vec![], None);
        assert_eq!(plain.store_key(), "user:42");

        let scoped = CacheEntry::new("42", Some("users".to_string()), vec![], None);
        assert_eq!(scoped.store_key(), "users:42");
    }

    #[test]
    fn test_ttl_persistent() {
        let entry = CacheEntry::new("k", None, vec![], None);
        assert_eq!(entry.ttl(), TimeToLive::Persistent);
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", None, vec![], Some(now + ChronoDuration::seconds(10)));
        assert_eq!(
            entry.ttl_at(now),
            TimeToLive::Remaining(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_ttl_elapsed() {
        let now = Utc::now();
        let past = CacheEntry::new("k", None, vec![], Some(now - ChronoDuration::seconds(1)));
        assert_eq!(past.ttl_at(now), TimeToLive::Elapsed);

        // Boundary: expiring exactly now is already elapsed.
        let boundary = CacheEntry::new("k", None, vec![], Some(now));
        assert_eq!(boundary.ttl_at(now), TimeToLive::Elapsed);
    }

    #[test]
    fn test_ttl_sub_millisecond_is_elapsed() {
        let now = Utc::now();
        let entry = CacheEntry::new(
            "k",
            None,
            vec![],
            Some(now + ChronoDuration::microseconds(400)),
        );
        assert_eq!(entry.ttl_at(now), TimeToLive::Elapsed);
    }

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("orders").is_ok());
        assert!(matches!(validate_prefix(""), Err(CacheError::Usage(_))));
        assert!(matches!(validate_prefix("  \t"), Err(CacheError::Usage(_))));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("k").is_ok());
        assert!(matches!(validate_key(""), Err(CacheError::Usage(_))));
    }

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key(Some("tenant"), "k"), "tenant:k");
        assert_eq!(namespaced_key(None, "k"), "k");
    }
}
