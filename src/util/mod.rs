//! # Utility Modules
//!
//! Rate-limited logging and tracing helpers shared by the radio core.

pub mod logging;

pub use logging::{LogThrottle, ThrottleStats};
