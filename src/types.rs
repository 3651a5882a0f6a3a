//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed since `start`, or 0 if the clock stepped backwards.
pub fn elapsed_ms(start: u64) -> u64 {
    now_ms().saturating_sub(start)
}
