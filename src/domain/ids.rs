//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers that cross the
//! HTTP boundary. Each type ensures type safety and validates format on
//! construction, so the rest of the pipeline never re-checks them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Export job identifier newtype wrapper
///
/// A UUID in canonical hyphenated form, minted at submission time.
///
/// # Examples
///
/// ```
/// use caravan::domain::ids::JobId;
/// use std::str::FromStr;
///
/// let job_id = JobId::from_str("7d44b88c-4199-4bad-97dc-d78268e01398").unwrap();
/// assert_eq!(job_id.as_str(), "7d44b88c-4199-4bad-97dc-d78268e01398");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new JobId from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        uuid::Uuid::parse_str(&id).map_err(|_| format!("Invalid job id: {id}"))?;
        Ok(Self(id))
    }

    /// Mints a fresh random job id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the job id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn idempotency_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("idempotency key pattern is valid")
    })
}

/// Client-supplied idempotency key newtype wrapper
///
/// Validated against a fixed pattern (1-128 characters from
/// `[A-Za-z0-9_-]`) before any store lookup happens.
///
/// # Examples
///
/// ```
/// use caravan::domain::ids::IdempotencyKey;
///
/// let key = IdempotencyKey::new("retry-2a9f8c31").unwrap();
/// assert_eq!(key.as_str(), "retry-2a9f8c31");
///
/// assert!(IdempotencyKey::new("no spaces allowed").is_err());
/// assert!(IdempotencyKey::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a new IdempotencyKey from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not match the fixed pattern.
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if !idempotency_key_pattern().is_match(&key) {
            return Err(format!(
                "Invalid idempotency key: must be 1-128 characters from [A-Za-z0-9_-], got {} characters",
                key.len()
            ));
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Authenticated consumer identifier newtype wrapper
///
/// Identifies the principal a request was made on behalf of. Used as the
/// per-consumer half of the rate-limit bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Creates a new ConsumerId from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or longer than 256 characters.
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Consumer id cannot be empty".to_string());
        }
        if id.len() > 256 {
            return Err("Consumer id cannot exceed 256 characters".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the consumer id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConsumerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ConsumerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
