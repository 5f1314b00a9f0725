use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stored value together with the time it was written and its time-to-live
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    data: Arc<[u8]>,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    /// Creates a new entry inserted at `inserted_at` that lives for `ttl`
    pub fn new(data: Arc<[u8]>, inserted_at: Instant, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at,
            ttl,
        }
    }

    /// Returns a shared reference to the stored bytes (zero-cost clone)
    pub fn data_shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Returns the instant at which this entry expires.
    ///
    /// `None` means the TTL is so large that the expiry lies beyond what the
    /// monotonic clock can represent, so the entry never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.inserted_at.checked_add(self.ttl)
    }

    /// Checks whether this entry is expired as of `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Checks whether this entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
