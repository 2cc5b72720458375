use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::error::ConfigError;
use crate::error::Result;
use crate::event::Listener;
use crate::event::ThrottleEvent;
use crate::pipeline::Pipeline;

/// Coordinator enforcing several pipelines as simultaneous constraints
///
/// Exchanges usually enforce more than one limit at once (a per-second burst
/// cap alongside a per-minute budget, say). A request is admitted only once
/// every pipeline it touches can take it, and the decide, sleep and consume
/// steps run under one FIFO lock so two callers can never spend the same
/// capacity.
///
/// Dropping an in-flight [`Throttler::check_and_wait`] while it sleeps
/// releases the lock without charging any pipeline.
pub struct Throttler {
    pipelines: Mutex<Vec<Pipeline>>,
    timeframes: Vec<String>,
    listeners: RwLock<Vec<Listener>>,
}

/// One pipeline charge made during an admission
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub timeframe: String,
    pub at: Instant,
    pub cost: u32,
}

/// Receipt for an admitted request, used to refund it if the call fails
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Admission {
    charges: Vec<Charge>,
    waited: Duration,
}

impl Admission {
    /// Charges in pipeline order
    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    /// Delay slept before the charges were made
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn is_empty(&self) -> bool {
        self.charges.is_empty()
    }
}

/// Point-in-time view of one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub timeframe: String,
    pub remaining: u32,
    pub limit: u32,
    pub remaining_rate: f64,
}

impl Throttler {
    /// Create a throttler from an ordered set of pipelines with unique timeframes
    pub fn new(pipelines: Vec<Pipeline>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(pipelines.len());
        for pipeline in &pipelines {
            if !seen.insert(pipeline.timeframe()) {
                return Err(ConfigError::DuplicateTimeframe(pipeline.timeframe().to_string()));
            }
        }

        let timeframes = pipelines.iter().map(|p| p.timeframe().to_string()).collect();
        Ok(Self { pipelines: Mutex::new(pipelines), timeframes, listeners: RwLock::new(Vec::new()) })
    }

    /// Create a throttler builder
    pub fn builder() -> ThrottlerBuilder {
        ThrottlerBuilder::new()
    }

    /// Pipeline labels in evaluation order
    pub fn timeframes(&self) -> &[String] {
        &self.timeframes
    }

    /// Register a listener for events raised by any pipeline
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Wait until every pipeline can take `cost`, then charge all of them
    pub async fn check_and_wait(&self, cost: u32) -> Admission {
        self.check_and_wait_with(|_| Some(cost)).await
    }

    /// Like [`Throttler::check_and_wait`], restricted to the named pipelines
    pub async fn check_and_wait_on(&self, timeframes: &[&str], cost: u32) -> Admission {
        self.check_and_wait_with(|p| timeframes.contains(&p.timeframe()).then_some(cost)).await
    }

    /// Admission with a per-pipeline cost.
    ///
    /// `select` maps each pipeline to the cost it should be charged, or `None`
    /// to leave it out of this admission entirely.
    pub async fn check_and_wait_with<F>(&self, select: F) -> Admission
    where
        F: Fn(&Pipeline) -> Option<u32>,
    {
        let mut pipelines = self.pipelines.lock().await;
        let costs: Vec<Option<u32>> = pipelines.iter().map(&select).collect();

        let wait = pipelines
            .iter_mut()
            .zip(&costs)
            .filter_map(|(pipeline, cost)| cost.map(|cost| pipeline.wait_time(cost)))
            .max()
            .unwrap_or(Duration::ZERO);

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_secs_f64() * 1000.0, "throttling request");
            tokio::time::sleep(wait).await;
        }

        let mut charges = Vec::with_capacity(costs.iter().flatten().count());
        for (pipeline, cost) in pipelines.iter_mut().zip(&costs) {
            let Some(cost) = *cost else {
                continue;
            };

            if cost > pipeline.window().limit() {
                warn!(timeframe = pipeline.timeframe(), cost, limit = pipeline.window().limit(), "cost exceeds pipeline limit");
            }

            let (at, event) = pipeline.consume(cost);
            if let Some(event) = event {
                self.dispatch(&event);
            }
            charges.push(Charge { timeframe: pipeline.timeframe().to_string(), at, cost });
        }

        Admission { charges, waited: wait }
    }

    /// Return the capacity charged by `admission` to each pipeline
    pub async fn refund(&self, admission: &Admission) {
        let mut pipelines = self.pipelines.lock().await;

        for charge in &admission.charges {
            if let Some(pipeline) = pipelines.iter_mut().find(|p| p.timeframe() == charge.timeframe) {
                pipeline.refund(charge.at, charge.cost);
                debug!(timeframe = %charge.timeframe, cost = charge.cost, "refunded");
            }
        }
    }

    /// Longest delay any pipeline would impose on `cost`, without charging
    pub async fn wait_time(&self, cost: u32) -> Duration {
        let mut pipelines = self.pipelines.lock().await;
        pipelines.iter_mut().map(|p| p.wait_time(cost)).max().unwrap_or(Duration::ZERO)
    }

    /// Current capacity of every pipeline
    pub async fn snapshot(&self) -> Vec<PipelineStatus> {
        let pipelines = self.pipelines.lock().await;

        pipelines
            .iter()
            .map(|p| PipelineStatus {
                timeframe: p.timeframe().to_string(),
                remaining: p.window().remaining(),
                limit: p.window().limit(),
                remaining_rate: p.window().remaining_rate(),
            })
            .collect()
    }

    fn dispatch(&self, event: &ThrottleEvent) {
        for listener in self.listeners.read().iter() {
            listener(event);
        }
    }
}

/// Builder for a throttler
#[derive(Default)]
pub struct ThrottlerBuilder {
    pipelines: Vec<Pipeline>,
}

impl ThrottlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline; pipelines are evaluated in insertion order
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn build(self) -> Result<Throttler> {
        Throttler::new(self.pipelines)
    }
}
