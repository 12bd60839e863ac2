use std::time::Duration;

use crate::error::Failure;

/// What to do after a failed attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait for `after`, then send the same request again.
    Retry { after: Duration },
    /// Hand the failure to the caller.
    Propagate,
}

/// Per-call back-off for throttled requests.
///
/// The policy is stateless and local to one call: it does not coordinate with other in-flight
/// requests, so concurrent callers may each hit a `429` and each back off independently.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Retry throttled calls automatically. Off by default.
    pub auto_retry: bool,
    /// Upper bound on attempts for one call, the first one included.
    pub max_attempts: u32,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(auto_retry: bool, max_attempts: u32) -> Self {
        Self {
            auto_retry,
            max_attempts,
        }
    }

    /// Decides whether a call that has made `attempts` attempts so far and just failed with
    /// `failure` should be retried.
    ///
    /// Only [`Failure::TooManyRequests`] is ever retried, after exactly the wait the server
    /// asked for.
    #[must_use]
    pub fn decide(&self, failure: &Failure, attempts: u32) -> Decision {
        match failure {
            Failure::TooManyRequests { wait, .. }
                if self.auto_retry && attempts < self.max_attempts =>
            {
                Decision::Retry { after: *wait }
            }
            _ => Decision::Propagate,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(false, 1)
    }
}
