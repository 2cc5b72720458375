pub mod binance;
pub mod upbit;

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tracing::debug;
use tracing::warn;
use xt_ratelimit::Pipeline;
use xt_ratelimit::Throttler;

use crate::errors::HttpError;
use crate::errors::Result;

pub use binance::BinanceThrottler;
pub use upbit::UpbitThrottler;

/// Admission step shared by the provider throttlers
pub(crate) struct Gate {
    throttler: Throttler,
    refund_on_error: bool,
    admission_timeout: Option<Duration>,
}

impl Gate {
    pub(crate) fn new(throttler: Throttler) -> Self {
        Self { throttler, refund_on_error: false, admission_timeout: None }
    }

    pub(crate) fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    pub(crate) fn set_refund_on_error(&mut self, enabled: bool) {
        self.refund_on_error = enabled;
    }

    pub(crate) fn set_admission_timeout(&mut self, timeout: Duration) {
        self.admission_timeout = Some(timeout);
    }

    /// Admit the request on the pipelines picked by `select`, then run `call`.
    ///
    /// The call's result is returned untouched. With refunds enabled, a call
    /// that failed before the exchange answered gives its capacity back.
    pub(crate) async fn call<E, S, F, Fut, T>(&self, endpoint: E, select: S, call: F) -> Result<T>
    where
        E: Debug,
        S: Fn(&Pipeline) -> Option<u32>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = match self.admission_timeout {
            Some(limit) => tokio::time::timeout(limit, self.throttler.check_and_wait_with(select)).await.map_err(|_| HttpError::Timeout(limit))?,
            None => self.throttler.check_and_wait_with(select).await,
        };
        debug!(?endpoint, waited_ms = admission.waited().as_millis() as u64, charges = admission.charges().len(), "admitted");

        match call().await {
            Ok(response) => Ok(response),
            Err(err) => {
                if self.refund_on_error && !err.was_serviced() {
                    warn!(?endpoint, error = %err, "request failed before reaching the exchange, refunding");
                    self.throttler.refund(&admission).await;
                }
                Err(err)
            }
        }
    }
}
