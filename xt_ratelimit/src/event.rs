use std::sync::Arc;

/// Notification raised when a pipeline's remaining capacity first drops below its threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleEvent {
    /// Label of the pipeline that crossed its threshold
    pub timeframe: String,

    /// `remaining / limit` at the time of the crossing
    pub remaining_rate: f64,

    /// Absolute capacity left at the time of the crossing
    pub remaining_cap: u32,
}

impl ThrottleEvent {
    pub fn new(timeframe: impl Into<String>, remaining_rate: f64, remaining_cap: u32) -> Self {
        Self { timeframe: timeframe.into(), remaining_rate, remaining_cap }
    }
}

/// Callback invoked synchronously for each [`ThrottleEvent`]
pub type Listener = Arc<dyn Fn(&ThrottleEvent) + Send + Sync>;
