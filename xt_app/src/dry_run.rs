//! Offline exchange client for pacing runs without network access

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use xt_http::BinanceApi;
use xt_http::NewOrder;
use xt_http::Result;
use xt_http::UpbitApi;
use xt_http::UpbitOrder;

const EMPTY_BODY: &[u8] = b"{}";

/// Answers every Binance and Upbit call with an empty JSON object
#[derive(Debug, Default)]
pub struct NoopExchange {
    calls: AtomicUsize,
}

impl NoopExchange {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn answer(&self) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Bytes::from_static(EMPTY_BODY))
    }
}

impl BinanceApi for NoopExchange {
    async fn ping(&self) -> Result<Bytes> {
        self.answer()
    }

    async fn server_time(&self) -> Result<Bytes> {
        self.answer()
    }

    async fn exchange_info(&self) -> Result<Bytes> {
        self.answer()
    }

    async fn depth(&self, _symbol: &str, _limit: u16) -> Result<Bytes> {
        self.answer()
    }

    async fn recent_trades(&self, _symbol: &str, _limit: u16) -> Result<Bytes> {
        self.answer()
    }

    async fn klines(&self, _symbol: &str, _interval: &str, _limit: u16) -> Result<Bytes> {
        self.answer()
    }

    async fn avg_price(&self, _symbol: &str) -> Result<Bytes> {
        self.answer()
    }

    async fn ticker_24h(&self, _symbol: Option<&str>) -> Result<Bytes> {
        self.answer()
    }

    async fn ticker_price(&self, _symbol: Option<&str>) -> Result<Bytes> {
        self.answer()
    }

    async fn new_order(&self, _order: &NewOrder) -> Result<Bytes> {
        self.answer()
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: u64) -> Result<Bytes> {
        self.answer()
    }

    async fn open_orders(&self, _symbol: Option<&str>) -> Result<Bytes> {
        self.answer()
    }

    async fn account(&self) -> Result<Bytes> {
        self.answer()
    }
}

impl UpbitApi for NoopExchange {
    async fn markets(&self) -> Result<Bytes> {
        self.answer()
    }

    async fn ticker(&self, _markets: &[&str]) -> Result<Bytes> {
        self.answer()
    }

    async fn orderbook(&self, _markets: &[&str]) -> Result<Bytes> {
        self.answer()
    }

    async fn candles_minutes(&self, _unit: u16, _market: &str, _count: u16) -> Result<Bytes> {
        self.answer()
    }

    async fn accounts(&self) -> Result<Bytes> {
        self.answer()
    }

    async fn order(&self, _uuid: &str) -> Result<Bytes> {
        self.answer()
    }

    async fn place_order(&self, _order: &UpbitOrder) -> Result<Bytes> {
        self.answer()
    }

    async fn cancel_order(&self, _uuid: &str) -> Result<Bytes> {
        self.answer()
    }
}
