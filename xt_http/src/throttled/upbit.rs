use std::time::Duration;

use bytes::Bytes;
use tracing::info;
use xt_ratelimit::exchanges::upbit::UpbitEndpoint;
use xt_ratelimit::exchanges::upbit::UpbitLimits;
use xt_ratelimit::ThrottleEvent;
use xt_ratelimit::Throttler;

use super::Gate;
use crate::errors::Result;
use crate::upbit::UpbitApi;
use crate::upbit::UpbitOrder;

/// Upbit client gated per request category
///
/// Each call costs one request on the per-second and per-minute pipelines of
/// its category and leaves the other categories alone.
pub struct UpbitThrottler<C> {
    client: C,
    gate: Gate,
}

impl<C: UpbitApi> UpbitThrottler<C> {
    pub fn new(client: C) -> Result<Self> {
        Self::with_limits(client, &UpbitLimits::default())
    }

    pub fn with_limits(client: C, limits: &UpbitLimits) -> Result<Self> {
        Ok(Self::with_throttler(client, limits.throttler()?))
    }

    pub fn with_throttler(client: C, throttler: Throttler) -> Self {
        info!(timeframes = ?throttler.timeframes(), "upbit throttler ready");
        Self { client, gate: Gate::new(throttler) }
    }

    pub fn refund_on_error(mut self, enabled: bool) -> Self {
        self.gate.set_refund_on_error(enabled);
        self
    }

    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.gate.set_admission_timeout(timeout);
        self
    }

    pub fn throttler(&self) -> &Throttler {
        self.gate.throttler()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.gate.throttler().subscribe(listener);
    }

    pub async fn markets(&self) -> Result<Bytes> {
        self.admit(UpbitEndpoint::Markets, || self.client.markets()).await
    }

    pub async fn ticker(&self, markets: &[&str]) -> Result<Bytes> {
        self.admit(UpbitEndpoint::Ticker, || self.client.ticker(markets)).await
    }

    pub async fn orderbook(&self, markets: &[&str]) -> Result<Bytes> {
        self.admit(UpbitEndpoint::Orderbook, || self.client.orderbook(markets)).await
    }

    pub async fn candles_minutes(&self, unit: u16, market: &str, count: u16) -> Result<Bytes> {
        self.admit(UpbitEndpoint::Candles, || self.client.candles_minutes(unit, market, count)).await
    }

    pub async fn accounts(&self) -> Result<Bytes> {
        self.admit(UpbitEndpoint::Accounts, || self.client.accounts()).await
    }

    pub async fn order(&self, uuid: &str) -> Result<Bytes> {
        self.admit(UpbitEndpoint::OrderInfo, || self.client.order(uuid)).await
    }

    pub async fn place_order(&self, order: &UpbitOrder) -> Result<Bytes> {
        self.admit(UpbitEndpoint::PlaceOrder, || self.client.place_order(order)).await
    }

    pub async fn cancel_order(&self, uuid: &str) -> Result<Bytes> {
        self.admit(UpbitEndpoint::CancelOrder, || self.client.cancel_order(uuid)).await
    }

    async fn admit<F, Fut>(&self, endpoint: UpbitEndpoint, call: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Bytes>>,
    {
        self.gate.call(endpoint, move |pipeline| endpoint.cost_on(pipeline.timeframe()), call).await
    }
}

impl<C> AsRef<Throttler> for UpbitThrottler<C> {
    fn as_ref(&self) -> &Throttler {
        self.gate.throttler()
    }
}
