//! Fixed-window request admission.

pub mod limiter;
pub mod policy;
pub mod sweeper;

pub use limiter::{Decision, FixedWindowLimiter, RateWindow};
pub use policy::{classify_path, LimiterSet, PolicyKind, RateLimitPolicy};
pub use sweeper::Sweeper;
