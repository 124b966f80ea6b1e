//! Session identifiers for connected transport pairs.
//!
//! A session id is minted once per successful `connect()` and shared by both
//! sides of the pair. It exists for logs and diagnostics only; nothing routes
//! on it and it is not a security token.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Diagnostic identifier shared by the two halves of a connected pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new session id using [`generate_session_id`].
    pub fn generate() -> Self {
        Self(generate_session_id())
    }

    /// Borrow the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a session id with the default strategy.
///
/// Uses a random v4 UUID. If that source yields nothing, falls back to the
/// current time in milliseconds followed by a random integer in `[0, 10^8)`.
pub fn generate_session_id() -> String {
    // ---
    generate_session_id_with(uuid_source, now_millis, random_unit)
}

/// Generate a session id from explicit sources.
///
/// - `uuid`: primary source; `None` or an empty string selects the fallback
/// - `now`: milliseconds since the Unix epoch
/// - `random`: a value in `[0.0, 1.0)`
///
/// The fallback is `format!("{now}{floor(random * 1e8)}")`. Injecting the
/// sources makes the fallback deterministic under test.
///
/// # Example
///
/// ```
/// use loopback_transport::generate_session_id_with;
///
/// let id = generate_session_id_with(|| None, || 1234567890, || 0.123456);
/// assert_eq!(id, "123456789012345600");
/// ```
pub fn generate_session_id_with<U, N, R>(uuid: U, now: N, random: R) -> String
where
    U: FnOnce() -> Option<String>,
    N: FnOnce() -> u64,
    R: FnOnce() -> f64,
{
    // ---
    match uuid() {
        Some(id) if !id.is_empty() => id,
        _ => {
            let suffix = (random() * 1e8).floor() as u64;
            format!("{}{}", now(), suffix)
        }
    }
}

fn uuid_source() -> Option<String> {
    Some(Uuid::new_v4().to_string())
}

fn now_millis() -> u64 {
    // A clock before the epoch only degrades the fallback, so treat it as 0.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Pseudo-random value in `[0.0, 1.0)`; good enough for a diagnostic id.
fn random_unit() -> f64 {
    let hash = RandomState::new().hash_one(SystemTime::now());
    (hash % 100_000_000) as f64 / 1e8
}
