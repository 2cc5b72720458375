//! # xt_ratelimit
//!
//! Client-side admission control for rate-limited exchange APIs.
//!
//! A [`Throttler`] owns a set of [`Pipeline`]s, each a named [`Window`]
//! ([`FixedWindow`] or [`SlidingWindow`]), and admits a request only once every
//! pipeline it touches can take its cost, pacing bursts evenly across the
//! remaining cycle.

pub mod config;
pub mod error;
pub mod event;
pub mod exchanges;
pub mod fixed_window;
pub mod monitor;
pub mod pipeline;
pub mod sliding_window;
pub mod snapshot;
pub mod throttler;
pub mod window;

pub use config::PipelineDescriptor;
pub use config::ThrottlePolicy;
pub use config::WindowDescriptor;
pub use config::WindowType;
pub use error::ConfigError;
pub use error::Result;
pub use event::Listener;
pub use event::ThrottleEvent;
pub use fixed_window::FixedWindow;
pub use monitor::UsageMonitor;
pub use pipeline::Pipeline;
pub use sliding_window::SlidingWindow;
pub use snapshot::RateLimitSnapshot;
pub use throttler::Admission;
pub use throttler::Charge;
pub use throttler::PipelineStatus;
pub use throttler::Throttler;
pub use throttler::ThrottlerBuilder;
pub use window::Window;
pub use window::DEFAULT_MAX_SOFT_DELAY;
