use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::error::Result;
use crate::fixed_window::FixedWindow;
use crate::pipeline::Pipeline;
use crate::sliding_window::SlidingWindow;
use crate::throttler::Throttler;
use crate::window::Window;

/// Recovery strategy of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Fixed,
    Sliding,
}

/// Declarative description of a window, as found in throttle profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub limit: u32,
    pub interval_seconds: f64,
    pub window_type: WindowType,
    #[serde(default)]
    pub max_soft_delay_ms: Option<u64>,
}

impl WindowDescriptor {
    pub fn fixed(limit: u32, interval_seconds: f64) -> Self {
        Self { limit, interval_seconds, window_type: WindowType::Fixed, max_soft_delay_ms: None }
    }

    pub fn sliding(limit: u32, interval_seconds: f64) -> Self {
        Self { limit, interval_seconds, window_type: WindowType::Sliding, max_soft_delay_ms: None }
    }

    pub fn interval(&self) -> Result<Duration> {
        if !self.interval_seconds.is_finite() || self.interval_seconds <= 0.0 {
            return Err(ConfigError::ZeroWindow);
        }
        Duration::try_from_secs_f64(self.interval_seconds).map_err(|_| ConfigError::ZeroWindow)
    }

    /// Instantiate the described window
    pub fn build(&self) -> Result<Box<dyn Window>> {
        let interval = self.interval()?;

        let window: Box<dyn Window> = match (self.window_type, self.max_soft_delay_ms) {
            (WindowType::Fixed, None) => Box::new(FixedWindow::new(self.limit, interval)?),
            (WindowType::Fixed, Some(ms)) => Box::new(FixedWindow::new(self.limit, interval)?.with_max_soft_delay(Duration::from_millis(ms))),
            (WindowType::Sliding, None) => Box::new(SlidingWindow::new(self.limit, interval)?),
            (WindowType::Sliding, Some(ms)) => {
                Box::new(SlidingWindow::new(self.limit, interval)?.with_max_soft_delay(Duration::from_millis(ms)))
            }
        };

        Ok(window)
    }
}

/// Declarative description of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub timeframe: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    pub window: WindowDescriptor,
}

impl PipelineDescriptor {
    pub fn new(timeframe: impl Into<String>, window: WindowDescriptor) -> Self {
        Self { timeframe: timeframe.into(), threshold: None, window }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn build(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::from_boxed(self.timeframe.clone(), self.window.build()?);
        match self.threshold {
            Some(threshold) => pipeline.with_threshold(threshold),
            None => Ok(pipeline),
        }
    }
}

impl Throttler {
    /// Build a throttler from pipeline descriptors, preserving their order
    pub fn from_descriptors(descriptors: &[PipelineDescriptor]) -> Result<Self> {
        let pipelines = descriptors.iter().map(PipelineDescriptor::build).collect::<Result<Vec<_>>>()?;
        Throttler::new(pipelines)
    }
}

/// Knobs for the adaptive usage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlePolicy {
    /// Usage ratio in [0, 1] at which callers should slow down
    pub threshold: f64,

    /// Number of usage samples kept for the moving average
    pub history_size: usize,

    /// Samples required before the moving average is trusted
    pub min_samples: usize,

    /// Consecutive recent samples at or above `threshold` that trigger a slowdown on their own
    pub short_window_threshold: usize,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self { threshold: 0.8, history_size: 20, min_samples: 5, short_window_threshold: 3 }
    }
}

impl ThrottlePolicy {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.history_size == 0 {
            return Err(ConfigError::ZeroCount { name: "history_size" });
        }
        if self.min_samples == 0 {
            return Err(ConfigError::ZeroCount { name: "min_samples" });
        }
        if self.short_window_threshold == 0 {
            return Err(ConfigError::ZeroCount { name: "short_window_threshold" });
        }
        if self.min_samples > self.history_size {
            return Err(ConfigError::MinSamplesExceedHistory { min_samples: self.min_samples, history_size: self.history_size });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builds_matching_window() {
        let fixed = WindowDescriptor::fixed(6000, 60.0).build().unwrap();
        assert_eq!(fixed.limit(), 6000);
        assert_eq!(fixed.window(), Duration::from_secs(60));

        let mut sliding = WindowDescriptor { max_soft_delay_ms: Some(250), ..WindowDescriptor::sliding(10, 0.5) }.build().unwrap();
        assert_eq!(sliding.window(), Duration::from_millis(500));
        assert_eq!(sliding.max_soft_delay(), Duration::from_millis(250));
        assert!(sliding.can_send(10));
    }

    #[test]
    fn test_descriptor_rejects_bad_interval() {
        assert_eq!(WindowDescriptor::fixed(10, 0.0).build().err(), Some(ConfigError::ZeroWindow));
        assert_eq!(WindowDescriptor::fixed(10, f64::NAN).build().err(), Some(ConfigError::ZeroWindow));
        assert_eq!(WindowDescriptor::fixed(0, 1.0).build().err(), Some(ConfigError::ZeroLimit));
    }

    #[test]
    fn test_window_type_serde() {
        let json = r#"{"limit": 100, "interval_seconds": 10, "window_type": "sliding"}"#;
        let descriptor: WindowDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor, WindowDescriptor::sliding(100, 10.0));

        let bad = r#"{"limit": 100, "interval_seconds": 10, "window_type": "leaky"}"#;
        assert!(serde_json::from_str::<WindowDescriptor>(bad).is_err());
    }

    #[test]
    fn test_throttler_from_descriptors() {
        let descriptors = vec![
            PipelineDescriptor::new("1s", WindowDescriptor::fixed(10, 1.0)),
            PipelineDescriptor::new("1m", WindowDescriptor::sliding(600, 60.0)).with_threshold(0.25),
        ];

        let throttler = Throttler::from_descriptors(&descriptors).unwrap();
        assert_eq!(throttler.timeframes(), ["1s", "1m"]);

        let bad = vec![PipelineDescriptor::new("1s", WindowDescriptor::fixed(10, 1.0)).with_threshold(2.0)];
        assert_eq!(Throttler::from_descriptors(&bad).err(), Some(ConfigError::ThresholdOutOfRange(2.0)));
    }

    #[test]
    fn test_policy_validation() {
        assert!(ThrottlePolicy::default().validate().is_ok());

        let policy = ThrottlePolicy { threshold: 1.2, ..Default::default() };
        assert_eq!(policy.validate(), Err(ConfigError::ThresholdOutOfRange(1.2)));

        let policy = ThrottlePolicy { history_size: 0, ..Default::default() };
        assert_eq!(policy.validate(), Err(ConfigError::ZeroCount { name: "history_size" }));

        let policy = ThrottlePolicy { min_samples: 30, ..Default::default() };
        assert_eq!(policy.validate(), Err(ConfigError::MinSamplesExceedHistory { min_samples: 30, history_size: 20 }));
    }
}
