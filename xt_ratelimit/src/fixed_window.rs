use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConfigError;
use crate::error::Result;
use crate::window::pace;
use crate::window::Window;
use crate::window::DEFAULT_MAX_SOFT_DELAY;

/// Fixed window with a full reset at cycle boundaries
///
/// The first cycle starts on the first consumption rather than at
/// construction, so a fresh window never delays. Once the clock passes
/// `next_reset_time`, capacity returns to `limit` and the next cycle is
/// anchored at the moment the expiry was observed.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    /// Maximum cost per cycle
    limit: u32,

    /// Capacity left in the current cycle
    remaining: u32,

    /// Cycle length
    window: Duration,

    /// Ceiling on the pacing delay
    max_soft_delay: Duration,

    /// End of the current cycle, unset until the first consumption
    next_reset_time: Option<Instant>,
}

impl FixedWindow {
    /// Create a fixed window allowing `limit` cost per `window`
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }

        Ok(Self { limit, remaining: limit, window, max_soft_delay: DEFAULT_MAX_SOFT_DELAY, next_reset_time: None })
    }

    /// Create a fixed window with a one second cycle
    pub fn per_second(limit: u32) -> Result<Self> {
        Self::new(limit, Duration::from_secs(1))
    }

    /// Create a fixed window with a one minute cycle
    pub fn per_minute(limit: u32) -> Result<Self> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Override the pacing ceiling
    pub fn with_max_soft_delay(mut self, max_soft_delay: Duration) -> Self {
        self.max_soft_delay = max_soft_delay;
        self
    }

    /// End of the current cycle, if one has started
    pub fn next_reset_time(&self) -> Option<Instant> {
        self.next_reset_time
    }

    #[inline]
    fn recover(&mut self, now: Instant) {
        if let Some(reset_at) = self.next_reset_time {
            if now >= reset_at {
                self.remaining = self.limit;
                self.next_reset_time = Some(now + self.window);
            }
        }
    }
}

impl Window for FixedWindow {
    fn can_send(&mut self, cost: u32) -> bool {
        self.recover(Instant::now());
        self.remaining >= cost
    }

    fn consume(&mut self, cost: u32) -> Instant {
        let now = Instant::now();
        self.recover(now);

        if cost == 0 {
            return now;
        }

        if self.next_reset_time.is_none() {
            self.next_reset_time = Some(now + self.window);
        }
        self.remaining = self.remaining.saturating_sub(cost);

        now
    }

    fn refund(&mut self, _at: Instant, cost: u32) {
        self.remaining = self.remaining.saturating_add(cost).min(self.limit);
    }

    fn wait_time(&mut self, cost: u32) -> Duration {
        if cost == 0 {
            return Duration::ZERO;
        }

        let now = Instant::now();
        self.recover(now);

        let Some(reset_at) = self.next_reset_time else {
            return Duration::ZERO;
        };
        let time_left = reset_at.saturating_duration_since(now);

        if cost > self.remaining {
            return time_left;
        }

        pace("fixed", self.remaining, cost, time_left, self.max_soft_delay)
    }

    fn remaining(&self) -> u32 {
        self.remaining
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn max_soft_delay(&self) -> Duration {
        self.max_soft_delay
    }
}
