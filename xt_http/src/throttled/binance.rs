use std::time::Duration;

use bytes::Bytes;
use tracing::info;
use xt_ratelimit::exchanges::binance::BinanceEndpoint;
use xt_ratelimit::exchanges::binance::BinanceLimits;
use xt_ratelimit::ThrottleEvent;
use xt_ratelimit::Throttler;

use super::Gate;
use crate::binance::BinanceApi;
use crate::binance::NewOrder;
use crate::errors::Result;

/// Binance client gated by the exchange's weight budget
///
/// Every call is charged its documented weight on `weight:1m`, one request on
/// `raw:5m` and, for order placement, one order on `orders:10s`. Pipelines
/// missing from the throttler are simply not charged.
pub struct BinanceThrottler<C> {
    client: C,
    gate: Gate,
}

impl<C: BinanceApi> BinanceThrottler<C> {
    /// Wrap `client` with the default Binance spot limits
    pub fn new(client: C) -> Result<Self> {
        Self::with_limits(client, &BinanceLimits::default())
    }

    pub fn with_limits(client: C, limits: &BinanceLimits) -> Result<Self> {
        Ok(Self::with_throttler(client, limits.throttler()?))
    }

    /// Wrap `client` with a custom pipeline set, typically built from a profile
    pub fn with_throttler(client: C, throttler: Throttler) -> Self {
        info!(timeframes = ?throttler.timeframes(), "binance throttler ready");
        Self { client, gate: Gate::new(throttler) }
    }

    /// Refund the admission when a call fails without reaching the exchange
    pub fn refund_on_error(mut self, enabled: bool) -> Self {
        self.gate.set_refund_on_error(enabled);
        self
    }

    /// Give up with [`crate::HttpError::Timeout`] if admission takes longer than `timeout`
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

    pub async fn ping(&self) -> Result<Bytes> {
        self.admit(BinanceEndpoint::Ping, || self.client.ping()).await
    }

    pub async fn server_time(&self) -> Result<Bytes> {
        self.admit(BinanceEndpoint::ServerTime, || self.client.server_time()).await
    }

    pub async fn exchange_info(&self) -> Result<Bytes> {
        self.admit(BinanceEndpoint::ExchangeInfo, || self.client.exchange_info()).await
    }

    pub async fn depth(&self, symbol: &str, limit: u16) -> Result<Bytes> {
        self.admit(BinanceEndpoint::Depth { limit }, || self.client.depth(symbol, limit)).await
    }

    pub async fn recent_trades(&self, symbol: &str, limit: u16) -> Result<Bytes> {
        self.admit(BinanceEndpoint::RecentTrades, || self.client.recent_trades(symbol, limit)).await
    }

    pub async fn klines(&self, symbol: &str, interval: &str, limit: u16) -> Result<Bytes> {
        self.admit(BinanceEndpoint::Klines, || self.client.klines(symbol, interval, limit)).await
    }

    pub async fn avg_price(&self, symbol: &str) -> Result<Bytes> {
        self.admit(BinanceEndpoint::AvgPrice, || self.client.avg_price(symbol)).await
    }

    pub async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Bytes> {
        let endpoint = BinanceEndpoint::Ticker24h { all_symbols: symbol.is_none() };
        self.admit(endpoint, || self.client.ticker_24h(symbol)).await
    }

    pub async fn ticker_price(&self, symbol: Option<&str>) -> Result<Bytes> {
        let endpoint = BinanceEndpoint::TickerPrice { all_symbols: symbol.is_none() };
        self.admit(endpoint, || self.client.ticker_price(symbol)).await
    }

    pub async fn new_order(&self, order: &NewOrder) -> Result<Bytes> {
        self.admit(BinanceEndpoint::NewOrder, || self.client.new_order(order)).await
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Bytes> {
        self.admit(BinanceEndpoint::CancelOrder, || self.client.cancel_order(symbol, order_id)).await
    }

    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Bytes> {
        let endpoint = BinanceEndpoint::OpenOrders { all_symbols: symbol.is_none() };
        self.admit(endpoint, || self.client.open_orders(symbol)).await
    }

    pub async fn account(&self) -> Result<Bytes> {
        self.admit(BinanceEndpoint::Account, || self.client.account()).await
    }

    async fn admit<F, Fut>(&self, endpoint: BinanceEndpoint, call: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Bytes>>,
    {
        self.gate.call(endpoint, move |pipeline| endpoint.cost_on(pipeline.timeframe()), call).await
    }
}

impl<C> AsRef<Throttler> for BinanceThrottler<C> {
    fn as_ref(&self) -> &Throttler {
        self.gate.throttler()
    }
}
