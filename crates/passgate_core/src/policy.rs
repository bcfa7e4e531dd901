//! Pass policy: category durations and expiry computation. Pure.

use chrono::{DateTime, Duration, Utc};

use crate::types::PassCategory;

pub fn duration(category: PassCategory) -> Duration {
    match category {
        PassCategory::Hours24 => Duration::hours(24),
        PassCategory::Days3 => Duration::days(3),
        PassCategory::Days7 => Duration::days(7),
        PassCategory::Days30 => Duration::days(30),
    }
}

pub fn expiry_of(category: PassCategory, activated_at: DateTime<Utc>) -> DateTime<Utc> {
    activated_at + duration(category)
}
