use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConfigError;
use crate::error::Result;
use crate::window::pace;
use crate::window::Window;
use crate::window::DEFAULT_MAX_SOFT_DELAY;

/// Sliding window where each charge expires individually
///
/// Every non-zero `consume` appends a `(timestamp, cost)` entry to the history, and an
/// entry stops counting `window` after it was recorded, so capacity recovers
/// continuously instead of in bulk. Invariant:
/// `remaining == limit - sum(cost of unexpired entries)` (saturating at 0).
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: u32,
    remaining: u32,
    window: Duration,
    max_soft_delay: Duration,

    /// Charges in chronological order
    history: VecDeque<(Instant, u32)>,
}

impl SlidingWindow {
    /// Create a sliding window allowing `limit` cost within any `window` span
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }

        Ok(Self { limit, remaining: limit, window, max_soft_delay: DEFAULT_MAX_SOFT_DELAY, history: VecDeque::new() })
    }

    /// Create a sliding window spanning one second
    pub fn per_second(limit: u32) -> Result<Self> {
        Self::new(limit, Duration::from_secs(1))
    }

    /// Create a sliding window spanning one minute
    pub fn per_minute(limit: u32) -> Result<Self> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Override the pacing ceiling
    pub fn with_max_soft_delay(mut self, max_soft_delay: Duration) -> Self {
        self.max_soft_delay = max_soft_delay;
        self
    }

    /// Number of charges still inside the window, as of the last access
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn used(&self) -> u64 {
        self.history.iter().map(|&(_, cost)| cost as u64).sum()
    }

    fn recompute(&mut self) {
        self.remaining = (self.limit as u64).saturating_sub(self.used()) as u32;
    }

    fn prune(&mut self, now: Instant) {
        let before = self.history.len();

        while let Some(&(at, _)) = self.history.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            self.history.pop_front();
        }

        if self.history.len() != before {
            self.recompute();
        }
    }

    /// Time until enough of the oldest charges expire to fit `cost`.
    ///
    /// With a single blocking entry this is the oldest entry's expiry. A cost
    /// above `limit` waits for the whole history to drain.
    fn time_until_capacity(&self, now: Instant, cost: u32) -> Duration {
        let mut used = self.used();

        for &(at, charged) in &self.history {
            used -= charged as u64;
            if (self.limit as u64).saturating_sub(used) >= cost as u64 {
                return (at + self.window).saturating_duration_since(now);
            }
        }

        self.history.back().map(|&(at, _)| (at + self.window).saturating_duration_since(now)).unwrap_or(Duration::ZERO)
    }
}

impl Window for SlidingWindow {
    fn can_send(&mut self, cost: u32) -> bool {
        self.prune(Instant::now());
        self.remaining >= cost
    }

    fn consume(&mut self, cost: u32) -> Instant {
        let now = Instant::now();
        self.prune(now);

        if cost == 0 {
            return now;
        }

        self.history.push_back((now, cost));
        self.recompute();

        now
    }

    fn refund(&mut self, at: Instant, cost: u32) {
        // Most recent match first, so a refund undoes the latest identical charge
        if let Some(idx) = self.history.iter().rposition(|&(ts, charged)| ts == at && charged == cost) {
            self.history.remove(idx);
            self.recompute();
        }
    }

    fn wait_time(&mut self, cost: u32) -> Duration {
        if cost == 0 {
            return Duration::ZERO;
        }

        let now = Instant::now();
        self.prune(now);

        let Some(&(oldest, _)) = self.history.front() else {
            return Duration::ZERO;
        };

        if cost > self.remaining {
            return self.time_until_capacity(now, cost);
        }

        let time_left = (oldest + self.window).saturating_duration_since(now);
        pace("sliding", self.remaining, cost, time_left, self.max_soft_delay)
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

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tokio::time::advance;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_window_never_delays() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        assert_eq!(window.wait_time(1), Duration::ZERO);
        assert_eq!(window.wait_time(10), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cost_leaves_no_history() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        window.consume(0);

        assert_eq!(window.history_len(), 0);
        assert_eq!(window.remaining_rate(), 1.0);
        assert_eq!(window.wait_time(10), Duration::ZERO);

        window.consume(4);
        window.consume(0);
        assert_eq!(window.history_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_recovers_per_entry() {
        let mut window = SlidingWindow::per_second(10).unwrap();

        window.consume(4);
        advance(Duration::from_millis(500)).await;
        window.consume(3);
        assert_eq!(window.remaining(), 3);

        // First charge has expired, second has not
        advance(Duration::from_millis(600)).await;
        assert!(window.can_send(7));
        assert_eq!(window.remaining(), 7);
        assert_eq!(window.history_len(), 1);

        advance(Duration::from_millis(400)).await;
        assert!(window.can_send(10));
        assert_eq!(window.history_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_wait_is_oldest_expiry() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        window.consume(10);

        advance(Duration::from_millis(300)).await;
        assert_eq!(window.wait_time(1), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_wait_spans_several_entries() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        window.consume(3);
        advance(Duration::from_millis(100)).await;
        window.consume(3);
        advance(Duration::from_millis(100)).await;
        window.consume(4);

        // Freeing the oldest entry leaves 3 < 5; the second one must go too
        assert_eq!(window.wait_time(5), Duration::from_millis(900));
        assert_eq!(window.wait_time(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_pacing_uses_oldest_entry() {
        let mut window = SlidingWindow::new(100, Duration::from_secs(10)).unwrap();
        window.consume(50);
        advance(Duration::from_secs(5)).await;

        // 5s until the oldest entry expires, 50 remaining
        assert!((window.wait_time(1).as_secs_f64() - 0.1).abs() < 1e-9);
        assert!((window.wait_time(3).as_secs_f64() - 0.3).abs() < 1e-9);
        assert_eq!(window.wait_time(20), DEFAULT_MAX_SOFT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_removes_latest_matching_entry() {
        let mut window = SlidingWindow::per_second(10).unwrap();

        let first = window.consume(2);
        let second = window.consume(2);
        assert_eq!(first, second);
        assert_eq!(window.history_len(), 2);

        window.refund(second, 2);
        assert_eq!(window.history_len(), 1);
        assert_eq!(window.remaining(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_without_match_is_noop() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        let at = window.consume(2);

        window.refund(at, 3);
        window.refund(at + Duration::from_millis(1), 2);
        assert_eq!(window.remaining(), 8);
        assert_eq!(window.history_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_reverses_consume() {
        let mut window = SlidingWindow::per_second(10).unwrap();
        window.consume(3);
        advance(Duration::from_millis(10)).await;

        let before = window.remaining();
        let at = window.consume(4);
        window.refund(at, 4);
        assert_eq!(window.remaining(), before);
    }

    proptest! {
        #[test]
        fn remaining_matches_history(limit in 1u32..200, ops in prop::collection::vec((0u8..3, 0u32..50), 1..64)) {
            let mut window = SlidingWindow::per_minute(limit).unwrap();
            let mut stamps = Vec::new();

            for (op, cost) in ops {
                match op {
                    0 | 1 => stamps.push((window.consume(cost), cost)),
                    _ => {
                        if let Some((at, cost)) = stamps.pop() {
                            window.refund(at, cost);
                        }
                    }
                }

                let expected = (limit as u64).saturating_sub(window.history.iter().map(|&(_, c)| c as u64).sum::<u64>());
                prop_assert_eq!(window.remaining() as u64, expected);
                prop_assert!(window.remaining() <= window.limit());
                prop_assert_eq!(window.history_len(), stamps.len());
            }
        }
    }
}
