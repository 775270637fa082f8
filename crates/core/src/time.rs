//! Epoch time helpers.
//!
//! Activity scores and event timestamps are whole seconds since the Unix
//! epoch; `updated_at` stamps are nanoseconds so repeated mutations within
//! the same second still order correctly.

use chrono::Utc;

/// Current time as whole seconds since the Unix epoch.
pub fn now_epoch_s() -> i64 {
    Utc::now().timestamp()
}

/// Current time as nanoseconds since the Unix epoch.
pub fn now_epoch_ns() -> i64 {
    // Saturates in the year 2262; fine for an `updated_at` stamp.
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
