use std::collections::VecDeque;

use crate::config::ThrottlePolicy;
use crate::error::Result;
use crate::snapshot::RateLimitSnapshot;

/// Moving view of server-reported usage
///
/// Feeds on [`RateLimitSnapshot`]s taken from responses and tells callers
/// when usage is running hot. It never touches a [`crate::Throttler`]; what
/// to do about a slowdown (switching to a tighter profile, pausing a
/// strategy) is up to the caller.
#[derive(Debug, Clone)]
pub struct UsageMonitor {
    policy: ThrottlePolicy,
    samples: VecDeque<f64>,
}

impl UsageMonitor {
    pub fn new(policy: ThrottlePolicy) -> Result<Self> {
        policy.validate()?;
        let samples = VecDeque::with_capacity(policy.history_size);
        Ok(Self { policy, samples })
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    /// Record the usage ratio of a snapshot, evicting the oldest sample when full
    pub fn record(&mut self, snapshot: &RateLimitSnapshot) {
        if self.samples.len() == self.policy.history_size {
            self.samples.pop_front();
        }
        self.samples.push_back(snapshot.usage_ratio());
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Average usage ratio, once at least `min_samples` have been recorded
    pub fn moving_average(&self) -> Option<f64> {
        if self.samples.len() < self.policy.min_samples {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Whether usage is at or above the policy threshold.
    ///
    /// True when the trusted moving average reaches the threshold, or when the
    /// last `short_window_threshold` samples all do, which reacts to bursts
    /// before enough history exists.
    pub fn should_slow_down(&self) -> bool {
        if self.moving_average().is_some_and(|avg| avg >= self.policy.threshold) {
            return true;
        }

        let recent = self.policy.short_window_threshold;
        self.samples.len() >= recent && self.samples.iter().rev().take(recent).all(|&ratio| ratio >= self.policy.threshold)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
