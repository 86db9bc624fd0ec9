//! # Logging Utilities
//!
//! Rate limiting for warnings that can fire at interrupt rate, and tracing
//! spans around resolver passes.
//!
//! ## Usage
//!
//! ```rust
//! use sx127x_rs::util::logging::LogThrottle;
//!
//! // At most 5 warnings per second
//! let mut throttle = LogThrottle::new(1000, 5);
//! if throttle.allow() {
//!     log::warn!("unexpected DIO0 edge while idle");
//! }
//! ```

use std::time::Instant;

use crate::radio::resolver::ResolverInput;

/// Throttling structure for rate-limiting log messages
///
/// A floating DIO line or a misconfigured mapping can raise edges far faster
/// than a log sink should record them.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Messages offered since creation
    seen: u64,
    /// Messages refused since creation
    suppressed: u64,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    ///
    /// # Arguments
    /// * `window_ms` - Time window in milliseconds
    /// * `cap` - Maximum messages allowed per window
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            seen: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    ///
    /// Returns `true` if the message should be logged, `false` if it
    /// should be throttled.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            if self.count > self.cap {
                log::debug!(
                    "{} log messages suppressed in the last window",
                    self.count - self.cap
                );
            }
            self.t0 = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);
        self.seen += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Get current throttle statistics
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            cap: self.cap,
            count: self.count,
            seen: self.seen,
            suppressed: self.suppressed,
        }
    }
}

/// Statistics about a log throttle instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    /// Messages allowed per window
    pub cap: u32,
    /// Messages offered in the current window
    pub count: u32,
    /// Messages offered since creation, logged or not
    pub seen: u64,
    pub suppressed: u64,
}

/// Create a tracing span covering one resolver input
#[cfg(feature = "tracing")]
pub fn span_resolver_pass(input: &ResolverInput) -> tracing::span::EnteredSpan {
    tracing::debug_span!("resolver_pass", input = ?input).entered()
}

/// Fallback span creation when tracing is not available
#[cfg(not(feature = "tracing"))]
pub fn span_resolver_pass(_input: &ResolverInput) {
    // No-op when tracing is disabled
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}
