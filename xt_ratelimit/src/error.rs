use thiserror::Error;

/// Result type for throttle configuration
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Invalid throttle configuration, rejected at construction time.
///
/// Capacity exhaustion is never an error: it is always resolved by waiting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window limit must be greater than 0")]
    ZeroLimit,

    #[error("window duration must be greater than 0")]
    ZeroWindow,

    #[error("threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("{name} must be greater than 0")]
    ZeroCount { name: &'static str },

    #[error("min_samples ({min_samples}) exceeds history_size ({history_size})")]
    MinSamplesExceedHistory { min_samples: usize, history_size: usize },

    #[error("remaining ({remaining}) exceeds limit ({limit})")]
    RemainingExceedsLimit { remaining: u32, limit: u32 },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("duplicate pipeline timeframe: {0}")]
    DuplicateTimeframe(String),

    #[error("invalid rate limit header {header}: {value:?}")]
    InvalidHeader { header: String, value: String },
}
