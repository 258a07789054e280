//! Bounded retry policy over response statuses.
//!
//! The CSRF recovery loop used to be an inline conditional; modeling it as
//! a small policy value makes the bound (two attempts total) and the
//! triggering statuses testable without a transport.

/// Decides whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    should_retry_status: fn(u16) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, should_retry_status: fn(u16) -> bool) -> Self {
        Self {
            max_attempts,
            should_retry_status,
        }
    }

    /// One automatic retry after a CSRF rejection. 403 and 419 are treated
    /// identically, matching the backend's conflation of the two.
    pub fn csrf_rejection() -> Self {
        Self::new(2, |status| status == 403 || status == 419)
    }

    /// Whether attempt number `attempt` (zero-based) that ended with
    /// `status` may be followed by another.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && (self.should_retry_status)(status)
    }
}
