//! Rate limiting module using a fixed-window counter per principal.
//!
//! Every chargeable frame (`message`, `typing`) draws from one shared budget
//! per principal. Pings are never charged.

mod config;
mod fixed_window;
mod limiter;

pub use config::{RateLimitConfig, DEFAULT_WINDOW_MS};
pub use fixed_window::{FixedWindow, WindowDecision};
pub use limiter::{RateLimitError, RateLimitResult, RateLimiter, RateLimiterStats};
