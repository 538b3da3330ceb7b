//! Expiration Policy
//!
//! Pure functions deciding whether an entry is live and what its TTL is.
//! Every read and write path in the cache goes through these.

use chrono::{DateTime, TimeDelta, Utc};

/// TTL reported for entries that never expire.
pub const TTL_NEVER: i64 = -1;

/// TTL reported for keys that are absent or expired.
pub const TTL_MISSING: i64 = -2;

// == Expiration Marker ==
/// When a stored entry stops being live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Entry never expires
    Never,
    /// Entry is live strictly before this instant
    At(DateTime<Utc>),
}

impl Expiration {
    /// Encodes the marker as the `exp` column value: fractional Unix seconds,
    /// NULL for `Never`.
    pub fn to_column(self) -> Option<f64> {
        match self {
            Expiration::Never => None,
            Expiration::At(at) => Some(at.timestamp_micros() as f64 / 1_000_000.0),
        }
    }

    /// Decodes an `exp` column value.
    ///
    /// Values outside chrono's representable range are treated as `Never`.
    pub fn from_column(exp: Option<f64>) -> Self {
        exp.and_then(|secs| DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64))
            .map_or(Expiration::Never, Expiration::At)
    }
}

/// Computes the expiration for a write made at `now` with `timeout` seconds.
///
/// Negative timeouts never expire. Zero expires immediately. A timeout too
/// large to represent as an instant is treated as never expiring.
pub fn compute_expiration(now: DateTime<Utc>, timeout: i64) -> Expiration {
    if timeout < 0 {
        return Expiration::Never;
    }
    TimeDelta::try_seconds(timeout)
        .and_then(|delta| now.checked_add_signed(delta))
        .map_or(Expiration::Never, Expiration::At)
}

/// Returns true if an entry with this marker is live at `now`.
///
/// The instant `now == expires_at` is already expired.
pub fn is_live(expires_at: Expiration, now: DateTime<Utc>) -> bool {
    match expires_at {
        Expiration::Never => true,
        Expiration::At(at) => now < at,
    }
}

/// Returns the TTL of an entry in whole seconds, rounded up.
///
/// - `TTL_NEVER` if the entry never expires
/// - `TTL_MISSING` if the entry has expired
/// - remaining seconds (always >= 1) otherwise
pub fn ttl(expires_at: Expiration, now: DateTime<Utc>) -> i64 {
    match expires_at {
        Expiration::Never => TTL_NEVER,
        Expiration::At(at) if now >= at => TTL_MISSING,
        Expiration::At(at) => {
            let remaining = at - now;
            let whole = remaining.num_seconds();
            if remaining > TimeDelta::seconds(whole) {
                whole + 1
            } else {
                whole
            }
        }
    }
}
