// Expiry policy
// Pure decisions over the stored expiry instant; callers pass `now` explicitly

use chrono::{DateTime, Duration, Utc};

/// Seconds before expiry within which a proactive refresh is triggered.
/// Must stay comfortably larger than the expected refresh round trip.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

/// An absent expiry is conservatively treated as already expired.
/// The expiry instant itself counts as expired.
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => true,
        Some(expires_at) => now >= expires_at,
    }
}

/// True when the token is within `buffer` of its expiry (or has no expiry)
pub fn is_expiring_soon(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    match expires_at {
        None => true,
        Some(expires_at) => now >= expires_at - buffer,
    }
}
