use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use xt_http::BinanceApi;
use xt_http::BinanceThrottler;
use xt_http::UpbitApi;
use xt_http::UpbitThrottler;
use xt_ratelimit::RateLimitSnapshot;
use xt_ratelimit::ThrottlePolicy;
use xt_ratelimit::Throttler;
use xt_ratelimit::UsageMonitor;

/// Outcome of a probe run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl ProbeReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Issue `requests` calls over `concurrency` tasks.
///
/// `call` receives the request index. Tasks pull indices from a shared
/// counter so a slow task never holds back the others.
pub async fn drive<F, Fut>(requests: usize, concurrency: usize, call: F) -> ProbeReport
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = xt_http::Result<Bytes>> + Send + 'static,
{
    let started = Instant::now();
    let call = Arc::new(call);
    let next = Arc::new(AtomicUsize::new(0));

    let workers = (0..concurrency.max(1)).map(|worker| {
        let call = call.clone();
        let next = next.clone();

        tokio::spawn(async move {
            let mut report = ProbeReport::default();
            loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= requests {
                    break;
                }

                match call(index).await {
                    Ok(body) => {
                        report.succeeded += 1;
                        debug!(worker, index, bytes = body.len(), "response");
                    }
                    Err(err) => {
                        report.failed += 1;
                        warn!(worker, index, error = %err, "request failed");
                    }
                }
            }
            report
        })
    });

    let mut report = ProbeReport::default();
    for result in join_all(workers).await {
        match result {
            Ok(worker) => {
                report.succeeded += worker.succeeded;
                report.failed += worker.failed;
            }
            Err(err) => error!(error = %err, "probe worker failed"),
        }
    }
    report.elapsed = started.elapsed();
    report
}

/// A throttled service whose exchange also reports usage in response headers
pub trait UsageSource: AsRef<Throttler> {
    fn server_usage(&self) -> Option<RateLimitSnapshot>;
}

impl<C: BinanceApi> UsageSource for BinanceThrottler<C> {
    fn server_usage(&self) -> Option<RateLimitSnapshot> {
        self.client().last_usage()
    }
}

impl<C: UpbitApi> UsageSource for UpbitThrottler<C> {
    fn server_usage(&self) -> Option<RateLimitSnapshot> {
        self.client().last_usage()
    }
}

/// Record one usage sample and report whether callers should back off.
///
/// The sample is the busier of the exchange's own count from the latest
/// response and the busiest local pipeline. The exchange count also sees
/// traffic from other processes sharing the key.
pub async fn record_usage(throttler: &Throttler, server: Option<RateLimitSnapshot>, monitor: &mut UsageMonitor) -> xt_ratelimit::Result<bool> {
    let busiest = throttler.snapshot().await.into_iter().min_by(|a, b| a.remaining_rate.total_cmp(&b.remaining_rate));
    let local = busiest.map(|status| RateLimitSnapshot::new(status.remaining, status.limit, None)).transpose()?;

    let sample = match (server, local) {
        (Some(server), Some(local)) if local.usage_ratio() > server.usage_ratio() => Some(local),
        (Some(server), _) => Some(server),
        (None, local) => local,
    };

    if let Some(sample) = sample {
        monitor.record(&sample);
    }

    Ok(monitor.should_slow_down())
}

/// Sample usage every `period` until the returned task is aborted
pub fn watch_usage<T>(service: Arc<T>, policy: ThrottlePolicy, period: Duration) -> xt_ratelimit::Result<JoinHandle<()>>
where
    T: UsageSource + Send + Sync + 'static,
{
    let mut monitor = UsageMonitor::new(policy)?;

    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        let mut slowing = false;

        loop {
            ticker.tick().await;

            match record_usage((*service).as_ref(), service.server_usage(), &mut monitor).await {
                Ok(slow_down) if slow_down != slowing => {
                    slowing = slow_down;
                    if slowing {
                        warn!(average = monitor.moving_average(), latest = monitor.latest(), "usage above policy threshold, slow down");
                    } else {
                        info!(average = monitor.moving_average(), "usage back under policy threshold");
                    }
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "invalid usage sample"),
            }
        }
    }))
}

/// Log the state of every pipeline
pub async fn log_snapshot(throttler: &Throttler) {
    for status in throttler.snapshot().await {
        info!(timeframe = %status.timeframe, remaining = status.remaining, limit = status.limit, remaining_rate = status.remaining_rate, "pipeline");
    }
}
