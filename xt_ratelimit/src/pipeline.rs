use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConfigError;
use crate::error::Result;
use crate::event::Listener;
use crate::event::ThrottleEvent;
use crate::window::Window;

/// One named rate constraint: a window plus optional threshold notifications
///
/// Notifications are edge-triggered. The first `consume` that leaves the
/// remaining rate below `threshold` fires once; later charges fire nothing
/// until the rate has been observed at or above the threshold again.
pub struct Pipeline {
    timeframe: String,
    window: Box<dyn Window>,
    threshold: Option<f64>,
    below_threshold: bool,
    listeners: Vec<Listener>,
}

impl Pipeline {
    /// Create a pipeline without notifications
    pub fn new(timeframe: impl Into<String>, window: impl Window + 'static) -> Self {
        Self::from_boxed(timeframe, Box::new(window))
    }

    /// Create a pipeline around an already boxed window
    pub fn from_boxed(timeframe: impl Into<String>, window: Box<dyn Window>) -> Self {
        Self { timeframe: timeframe.into(), window, threshold: None, below_threshold: false, listeners: Vec::new() }
    }

    /// Enable notifications when `remaining_rate` drops below `threshold`
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        self.threshold = Some(threshold);
        Ok(self)
    }

    /// Register a listener, called in registration order
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn window(&self) -> &dyn Window {
        self.window.as_ref()
    }

    pub fn can_send(&mut self, cost: u32) -> bool {
        self.window.can_send(cost)
    }

    pub fn wait_time(&mut self, cost: u32) -> Duration {
        self.window.wait_time(cost)
    }

    pub fn refund(&mut self, at: Instant, cost: u32) {
        self.window.refund(at, cost);
    }

    /// Charge the window and evaluate the threshold.
    ///
    /// Returns the consumption instant and the event raised by this charge,
    /// which has already been delivered to this pipeline's listeners.
    pub fn consume(&mut self, cost: u32) -> (Instant, Option<ThrottleEvent>) {
        let at = self.window.consume(cost);
        (at, self.check_threshold())
    }

    fn check_threshold(&mut self) -> Option<ThrottleEvent> {
        let threshold = self.threshold?;
        let rate = self.window.remaining_rate();

        if rate >= threshold {
            self.below_threshold = false;
            return None;
        }
        if self.below_threshold {
            return None;
        }

        self.below_threshold = true;
        let event = ThrottleEvent::new(self.timeframe.clone(), rate, self.window.remaining());
        tracing::warn!(timeframe = %event.timeframe, remaining_rate = event.remaining_rate, remaining = event.remaining_cap, "pipeline dropped below threshold");

        for listener in &self.listeners {
            listener(&event);
        }

        Some(event)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("timeframe", &self.timeframe)
            .field("remaining", &self.window.remaining())
            .field("limit", &self.window.limit())
            .field("threshold", &self.threshold)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::time::advance;

    use super::*;
    use crate::FixedWindow;
    use crate::SlidingWindow;

    fn recording(pipeline: &mut Pipeline) -> Arc<Mutex<Vec<ThrottleEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        pipeline.subscribe(move |event| sink.lock().push(event.clone()));
        events
    }

    #[test]
    fn test_threshold_validation() {
        let window = FixedWindow::per_second(10).unwrap();
        let err = Pipeline::new("1s", window.clone()).with_threshold(1.5).unwrap_err();
        assert_eq!(err, ConfigError::ThresholdOutOfRange(1.5));
        assert!(Pipeline::new("1s", window.clone()).with_threshold(-0.1).is_err());
        assert!(Pipeline::new("1s", window.clone()).with_threshold(0.0).is_ok());
        assert!(Pipeline::new("1s", window).with_threshold(1.0).is_ok());
    }

    #[test]
    fn test_delegates_to_window() {
        let mut pipeline = Pipeline::new("1m", FixedWindow::per_minute(100).unwrap());

        assert!(pipeline.can_send(100));
        let (at, event) = pipeline.consume(30);
        assert!(event.is_none());
        assert_eq!(pipeline.window().remaining(), 70);

        pipeline.refund(at, 30);
        assert_eq!(pipeline.window().remaining(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_triggered_notifications() {
        let mut pipeline = Pipeline::new("1s", SlidingWindow::per_second(10).unwrap()).with_threshold(0.5).unwrap();
        let events = recording(&mut pipeline);

        // 0.6, still above
        pipeline.consume(4);
        assert!(events.lock().is_empty());

        // 0.4, first crossing
        let (_, event) = pipeline.consume(2);
        let event = event.expect("crossing should raise an event");
        assert_eq!(event.timeframe, "1s");
        assert_eq!(event.remaining_cap, 4);
        assert!((event.remaining_rate - 0.4).abs() < f64::EPSILON);
        assert_eq!(events.lock().len(), 1);

        // Still below, no repeat
        pipeline.consume(1);
        pipeline.consume(1);
        assert_eq!(events.lock().len(), 1);

        // Recover above the threshold, then drop again
        advance(Duration::from_secs(1)).await;
        let (_, event) = pipeline.consume(1);
        assert!(event.is_none());
        pipeline.consume(5);
        assert_eq!(events.lock().len(), 2);
        assert_eq!(events.lock()[1].remaining_cap, 4);
    }

    #[test]
    fn test_no_threshold_never_notifies() {
        let mut pipeline = Pipeline::new("1s", FixedWindow::per_second(10).unwrap());
        let events = recording(&mut pipeline);

        pipeline.consume(10);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_listeners_called_in_order() {
        let mut pipeline = Pipeline::new("1s", FixedWindow::per_second(2).unwrap()).with_threshold(1.0).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = Arc::clone(&order);
            pipeline.subscribe(move |_| order.lock().push(id));
        }

        pipeline.consume(1);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
