//! Memcache expiration times.
//!
//! `0` means the item never expires. Values up to 30 days are relative to now, larger values are
//! absolute Unix timestamps. Negative values and timestamps that already passed mean the item is
//! expired as soon as it is written.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::Expiry;

/// Largest exptime interpreted as a number of seconds from now.
pub const MAX_RELATIVE_EXPTIME: i64 = 60 * 60 * 24 * 30;

/// Converts an exptime to a backend expiry, `None` when the item is already expired.
pub fn expiry(exptime: i64) -> Option<Expiry> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    expiry_at(exptime, now)
}

/// [`expiry`] against the given Unix time, in seconds.
pub fn expiry_at(exptime: i64, now: u64) -> Option<Expiry> {
    match exptime {
        0 => Some(Expiry::Never),
        i64::MIN..=-1 => None,
        1..=MAX_RELATIVE_EXPTIME => Some(Expiry::After(Duration::from_secs(exptime as u64))),
        _ => {
            let at = exptime as u64;
            (at > now).then(|| Expiry::After(Duration::from_secs(at - now)))
        }
    }
}
