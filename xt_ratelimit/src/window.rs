use std::time::Duration;

use tokio::time::Instant;

/// Default ceiling on the pacing delay returned by [`Window::wait_time`].
pub const DEFAULT_MAX_SOFT_DELAY: Duration = Duration::from_millis(500);

/// A single time-boxed capacity tracker.
///
/// Recovery (fixed resets, sliding expiry) is applied lazily whenever
/// `can_send`, `consume` or `wait_time` run. There is no background timer.
///
/// Implementations are single-writer: callers sharing a window across tasks
/// must serialise access, which [`crate::Throttler`] does with its admission lock.
pub trait Window: Send {
    /// Whether `cost` units fit into the remaining capacity right now
    fn can_send(&mut self, cost: u32) -> bool;

    /// Charge `cost` units and return the instant of consumption.
    ///
    /// The instant is the refund key for sliding windows.
    fn consume(&mut self, cost: u32) -> Instant;

    /// Give back `cost` units previously charged at `at`.
    fn refund(&mut self, at: Instant, cost: u32);

    /// How long a caller should wait before sending `cost` units.
    ///
    /// Zero for a window with no cycle reference yet, the time until capacity
    /// structurally returns when `cost` exceeds what remains, and otherwise an
    /// equal-distribution pacing delay capped at [`Window::max_soft_delay`].
    fn wait_time(&mut self, cost: u32) -> Duration;

    /// Remaining capacity as last computed
    fn remaining(&self) -> u32;

    /// Capacity per cycle
    fn limit(&self) -> u32;

    /// Cycle length
    fn window(&self) -> Duration;

    /// Upper bound on the pacing delay
    fn max_soft_delay(&self) -> Duration;

    /// `remaining / limit`
    fn remaining_rate(&self) -> f64 {
        self.remaining() as f64 / self.limit() as f64
    }
}

/// Equal-distribution pacing shared by both window strategies.
///
/// `time_left` is the time until the cycle reference turns over.
pub(crate) fn pace(kind: &'static str, remaining: u32, cost: u32, time_left: Duration, max_soft_delay: Duration) -> Duration {
    debug_assert!(cost <= remaining && remaining > 0);

    let per_unit = time_left.as_secs_f64() / remaining as f64;
    let wait = per_unit * cost as f64;

    if wait > max_soft_delay.as_secs_f64() {
        tracing::warn!(
            window = kind,
            cost,
            remaining,
            uncapped_secs = wait,
            recovery_secs = time_left.as_secs_f64(),
            cap_secs = max_soft_delay.as_secs_f64(),
            "soft delay exceeds cap, clamping"
        );
        return max_soft_delay;
    }

    Duration::from_secs_f64(wait)
}
