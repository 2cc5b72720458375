//! Upbit rate limit topology
//!
//! Upbit partitions its limits into request groups. Each group has its own
//! budget, bounded both per second and per minute, and a call only spends
//! from the group it belongs to. Every call costs one request.
//!
//! Reference: https://global-docs.upbit.com/reference/rate-limits

use std::fmt;

use crate::error::Result;
use crate::FixedWindow;
use crate::Pipeline;
use crate::SlidingWindow;
use crate::Throttler;

/// Request group a call is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpbitCategory {
    /// Quotation endpoints
    Market,
    /// Order placement and cancellation
    Order,
    /// Balances and order queries
    Account,
}

impl UpbitCategory {
    pub const ALL: [UpbitCategory; 3] = [UpbitCategory::Market, UpbitCategory::Order, UpbitCategory::Account];

    pub fn label(self) -> &'static str {
        match self {
            UpbitCategory::Market => "market",
            UpbitCategory::Order => "order",
            UpbitCategory::Account => "account",
        }
    }

    /// Label of the per-second pipeline
    pub fn per_second(self) -> &'static str {
        match self {
            UpbitCategory::Market => "market:1s",
            UpbitCategory::Order => "order:1s",
            UpbitCategory::Account => "account:1s",
        }
    }

    /// Label of the per-minute pipeline
    pub fn per_minute(self) -> &'static str {
        match self {
            UpbitCategory::Market => "market:1m",
            UpbitCategory::Order => "order:1m",
            UpbitCategory::Account => "account:1m",
        }
    }

    /// Category of a request group named in Upbit's `Remaining-Req` header.
    ///
    /// Quotation groups (`market`, `candles`, `ticker`, ...) all map to
    /// [`UpbitCategory::Market`]; `default` covers the account endpoints.
    pub fn from_group(group: &str) -> UpbitCategory {
        match group {
            "order" | "order-cancel-all" => UpbitCategory::Order,
            "default" => UpbitCategory::Account,
            _ => UpbitCategory::Market,
        }
    }

    pub fn timeframes(self) -> [&'static str; 2] {
        [self.per_second(), self.per_minute()]
    }
}

impl fmt::Display for UpbitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-second and per-minute request budget of one category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryLimit {
    pub per_second: u32,
    pub per_minute: u32,
}

/// Upbit limits for every category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpbitLimits {
    pub market: CategoryLimit,
    pub order: CategoryLimit,
    pub account: CategoryLimit,

    /// Remaining-rate threshold applied to the per-minute pipelines
    pub threshold: Option<f64>,
}

impl Default for UpbitLimits {
    fn default() -> Self {
        Self {
            market: CategoryLimit { per_second: 10, per_minute: 600 },
            order: CategoryLimit { per_second: 8, per_minute: 200 },
            account: CategoryLimit { per_second: 30, per_minute: 900 },
            threshold: Some(0.1),
        }
    }
}

impl UpbitLimits {
    pub fn limit_for(&self, category: UpbitCategory) -> CategoryLimit {
        match category {
            UpbitCategory::Market => self.market,
            UpbitCategory::Order => self.order,
            UpbitCategory::Account => self.account,
        }
    }

    /// One pipeline pair per category.
    ///
    /// The per-second budget slides so bursts straddling a second boundary
    /// are still bounded; the per-minute budget resets in bulk.
    pub fn pipelines(&self) -> Result<Vec<Pipeline>> {
        let mut pipelines = Vec::with_capacity(UpbitCategory::ALL.len() * 2);

        for category in UpbitCategory::ALL {
            let limit = self.limit_for(category);
            pipelines.push(Pipeline::new(category.per_second(), SlidingWindow::per_second(limit.per_second)?));

            let mut per_minute = Pipeline::new(category.per_minute(), FixedWindow::per_minute(limit.per_minute)?);
            if let Some(threshold) = self.threshold {
                per_minute = per_minute.with_threshold(threshold)?;
            }
            pipelines.push(per_minute);
        }

        Ok(pipelines)
    }

    pub fn throttler(&self) -> Result<Throttler> {
        Throttler::new(self.pipelines()?)
    }
}

/// Throttled Upbit endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpbitEndpoint {
    Markets,
    Ticker,
    Orderbook,
    Candles,
    Accounts,
    OrderInfo,
    PlaceOrder,
    CancelOrder,
}

impl UpbitEndpoint {
    pub fn category(self) -> UpbitCategory {
        match self {
            UpbitEndpoint::Markets | UpbitEndpoint::Ticker | UpbitEndpoint::Orderbook | UpbitEndpoint::Candles => UpbitCategory::Market,
            UpbitEndpoint::PlaceOrder | UpbitEndpoint::CancelOrder => UpbitCategory::Order,
            UpbitEndpoint::Accounts | UpbitEndpoint::OrderInfo => UpbitCategory::Account,
        }
    }

    /// Cost on a pipeline: one request within the endpoint's category, nothing elsewhere
    pub fn cost_on(self, timeframe: &str) -> Option<u32> {
        self.category().timeframes().contains(&timeframe).then_some(1)
    }
}
