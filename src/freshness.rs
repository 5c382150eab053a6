// ⏰ Cache Freshness Gate
//
// A cached fact is usable iff it was observed no longer than max_age ago.
// The boundary is inclusive. A fact with no observation time is stale.

use crate::config::CachePolicy;
use chrono::{DateTime, Duration, Utc};

pub fn is_fresh(observed_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match observed_at {
        Some(observed) => now - observed <= max_age,
        None => false,
    }
}

impl CachePolicy {
    pub fn is_fresh(&self, observed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        is_fresh(observed_at, now, self.max_age())
    }

    /// Inverse of `is_fresh`, reads better at refetch call sites
    pub fn needs_refresh(&self, observed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        !self.is_fresh(observed_at, now)
    }
}
