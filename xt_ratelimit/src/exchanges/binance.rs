//! Binance spot rate limit topology
//!
//! Binance enforces several limits simultaneously:
//! - **REQUEST_WEIGHT**: weighted requests based on endpoint cost, per minute
//! - **RAW_REQUESTS**: number of requests regardless of weight, per 5 minutes
//! - **ORDERS**: order placements, per 10 seconds
//!
//! Reference: https://developers.binance.com/docs/binance-spot-api-docs/rest-api/limits

use std::time::Duration;

use crate::error::Result;
use crate::FixedWindow;
use crate::Pipeline;
use crate::Throttler;

pub const WEIGHT: &str = "weight:1m";
pub const RAW_REQUESTS: &str = "raw:5m";
pub const ORDERS: &str = "orders:10s";

/// Binance spot limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinanceLimits {
    /// Request weight per minute
    pub weight_per_minute: u32,

    /// Raw requests per 5 minutes, `None` to skip the pipeline
    pub raw_requests_per_5m: Option<u32>,

    /// Orders per 10 seconds, `None` to skip the pipeline
    pub orders_per_10s: Option<u32>,

    /// Remaining-rate threshold for weight notifications
    pub weight_threshold: Option<f64>,
}

impl Default for BinanceLimits {
    fn default() -> Self {
        Self { weight_per_minute: 6000, raw_requests_per_5m: Some(61_000), orders_per_10s: Some(100), weight_threshold: Some(0.2) }
    }
}

impl BinanceLimits {
    /// Two thirds of the published weight budget, for accounts sharing an IP
    pub fn conservative() -> Self {
        Self { weight_per_minute: 4000, raw_requests_per_5m: Some(40_000), orders_per_10s: Some(50), weight_threshold: Some(0.3) }
    }

    /// Weight pipeline only
    pub fn weight_only(weight_per_minute: u32) -> Self {
        Self { weight_per_minute, raw_requests_per_5m: None, orders_per_10s: None, weight_threshold: None }
    }

    pub fn pipelines(&self) -> Result<Vec<Pipeline>> {
        let mut weight = Pipeline::new(WEIGHT, FixedWindow::per_minute(self.weight_per_minute)?);
        if let Some(threshold) = self.weight_threshold {
            weight = weight.with_threshold(threshold)?;
        }

        let mut pipelines = vec![weight];
        if let Some(limit) = self.raw_requests_per_5m {
            pipelines.push(Pipeline::new(RAW_REQUESTS, FixedWindow::new(limit, Duration::from_secs(300))?));
        }
        if let Some(limit) = self.orders_per_10s {
            pipelines.push(Pipeline::new(ORDERS, FixedWindow::new(limit, Duration::from_secs(10))?));
        }

        Ok(pipelines)
    }

    pub fn throttler(&self) -> Result<Throttler> {
        Throttler::new(self.pipelines()?)
    }
}

/// Throttled Binance spot endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceEndpoint {
    Ping,
    ServerTime,
    ExchangeInfo,
    Depth { limit: u16 },
    RecentTrades,
    Klines,
    AvgPrice,
    Ticker24h { all_symbols: bool },
    TickerPrice { all_symbols: bool },
    NewOrder,
    CancelOrder,
    OpenOrders { all_symbols: bool },
    Account,
}

impl BinanceEndpoint {
    /// Request weight charged by Binance
    pub fn weight(self) -> u32 {
        match self {
            BinanceEndpoint::Ping | BinanceEndpoint::ServerTime => 1,
            BinanceEndpoint::ExchangeInfo => 20,
            BinanceEndpoint::Depth { limit } => depth_weight(limit),
            BinanceEndpoint::RecentTrades => 25,
            BinanceEndpoint::Klines | BinanceEndpoint::AvgPrice => 2,
            BinanceEndpoint::Ticker24h { all_symbols: false } => 2,
            BinanceEndpoint::Ticker24h { all_symbols: true } => 80,
            BinanceEndpoint::TickerPrice { all_symbols: false } => 2,
            BinanceEndpoint::TickerPrice { all_symbols: true } => 4,
            BinanceEndpoint::NewOrder | BinanceEndpoint::CancelOrder => 1,
            BinanceEndpoint::OpenOrders { all_symbols: false } => 6,
            BinanceEndpoint::OpenOrders { all_symbols: true } => 80,
            BinanceEndpoint::Account => 20,
        }
    }

    /// Whether the call counts against the order placement limit
    pub fn is_order(self) -> bool {
        matches!(self, BinanceEndpoint::NewOrder)
    }

    /// Cost of this call on a pipeline of the Binance topology
    pub fn cost_on(self, timeframe: &str) -> Option<u32> {
        match timeframe {
            WEIGHT => Some(self.weight()),
            RAW_REQUESTS => Some(1),
            ORDERS => self.is_order().then_some(1),
            _ => None,
        }
    }
}

/// Depth weight scales with the requested page size
pub fn depth_weight(limit: u16) -> u32 {
    match limit {
        0..=100 => 5,
        101..=500 => 25,
        501..=1000 => 50,
        _ => 250,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_weight_tiers() {
        assert_eq!(depth_weight(5), 5);
        assert_eq!(depth_weight(100), 5);
        assert_eq!(depth_weight(101), 25);
        assert_eq!(depth_weight(500), 25);
        assert_eq!(depth_weight(1000), 50);
        assert_eq!(depth_weight(5000), 250);
    }

    #[test]
    fn test_list_all_costs_more() {
        assert!(BinanceEndpoint::Ticker24h { all_symbols: true }.weight() > BinanceEndpoint::Ticker24h { all_symbols: false }.weight());
        assert!(BinanceEndpoint::OpenOrders { all_symbols: true }.weight() > BinanceEndpoint::OpenOrders { all_symbols: false }.weight());
        assert_eq!(BinanceEndpoint::NewOrder.weight(), 1);
    }

    #[test]
    fn test_costs_per_pipeline() {
        let depth = BinanceEndpoint::Depth { limit: 500 };
        assert_eq!(depth.cost_on(WEIGHT), Some(25));
        assert_eq!(depth.cost_on(RAW_REQUESTS), Some(1));
        assert_eq!(depth.cost_on(ORDERS), None);

        assert_eq!(BinanceEndpoint::NewOrder.cost_on(ORDERS), Some(1));
        assert_eq!(BinanceEndpoint::CancelOrder.cost_on(ORDERS), None);
        assert_eq!(BinanceEndpoint::Account.cost_on("other"), None);
    }

    #[test]
    fn test_default_topology() {
        let throttler = BinanceLimits::default().throttler().unwrap();
        assert_eq!(throttler.timeframes(), [WEIGHT, RAW_REQUESTS, ORDERS]);

        let weight_only = BinanceLimits::weight_only(1200).throttler().unwrap();
        assert_eq!(weight_only.timeframes(), [WEIGHT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_charges_order_pipeline() {
        let throttler = BinanceLimits::default().throttler().unwrap();

        throttler.check_and_wait_with(|p| BinanceEndpoint::NewOrder.cost_on(p.timeframe())).await;
        throttler.check_and_wait_with(|p| BinanceEndpoint::Depth { limit: 1000 }.cost_on(p.timeframe())).await;

        let snapshot = throttler.snapshot().await;
        assert_eq!(snapshot[0].remaining, 6000 - 1 - 50);
        assert_eq!(snapshot[1].remaining, 61_000 - 2);
        assert_eq!(snapshot[2].remaining, 99);
    }
}
