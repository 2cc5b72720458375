use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::warn;
use url::form_urlencoded;
use xt_ratelimit::RateLimitSnapshot;

use crate::auth::binance_signature;
use crate::auth::Credentials;
use crate::client::HttpClient;
use crate::client::HttpClientConfig;
use crate::client::header_pairs;
use crate::errors::HttpError;
use crate::errors::Result;

const BINANCE_BASE_URL: &str = "https://api.binance.com";
const BINANCE_TESTNET_URL: &str = "https://testnet.binance.vision";
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;
const DEFAULT_WEIGHT_LIMIT: u32 = 6000;

/// Binance spot REST endpoints, returning raw response bodies
///
/// Implemented by [`BinanceClient`]; the throttled wrapper depends only on
/// this trait so any client (or a test fake) can sit behind it.
pub trait BinanceApi: Send + Sync {
    fn ping(&self) -> impl Future<Output = Result<Bytes>> + Send;

    fn server_time(&self) -> impl Future<Output = Result<Bytes>> + Send;

    fn exchange_info(&self) -> impl Future<Output = Result<Bytes>> + Send;

    fn depth(&self, symbol: &str, limit: u16) -> impl Future<Output = Result<Bytes>> + Send;

    fn recent_trades(&self, symbol: &str, limit: u16) -> impl Future<Output = Result<Bytes>> + Send;

    fn klines(&self, symbol: &str, interval: &str, limit: u16) -> impl Future<Output = Result<Bytes>> + Send;

    fn avg_price(&self, symbol: &str) -> impl Future<Output = Result<Bytes>> + Send;

    /// 24h statistics for one symbol, or every symbol when `None`
    fn ticker_24h(&self, symbol: Option<&str>) -> impl Future<Output = Result<Bytes>> + Send;

    /// Latest price for one symbol, or every symbol when `None`
    fn ticker_price(&self, symbol: Option<&str>) -> impl Future<Output = Result<Bytes>> + Send;

    fn new_order(&self, order: &NewOrder) -> impl Future<Output = Result<Bytes>> + Send;

    fn cancel_order(&self, symbol: &str, order_id: u64) -> impl Future<Output = Result<Bytes>> + Send;

    /// Open orders for one symbol, or every symbol when `None`
    fn open_orders(&self, symbol: Option<&str>) -> impl Future<Output = Result<Bytes>> + Send;

    fn account(&self) -> impl Future<Output = Result<Bytes>> + Send;

    /// Weight usage reported by the latest response, if the client tracks it
    fn last_usage(&self) -> Option<RateLimitSnapshot> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

/// Order placement request. Quantities and prices are decimal strings as Binance expects them.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: String,
    pub price: Option<String>,
}

impl NewOrder {
    /// Good-til-cancelled limit order
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: impl Into<String>, price: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), side, order_type: OrderType::Limit, quantity: quantity.into(), price: Some(price.into()) }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), side, order_type: OrderType::Market, quantity: quantity.into(), price: None }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("symbol", self.symbol.clone()), ("side", self.side.as_str().to_string())];

        match self.order_type {
            OrderType::Limit => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
            }
            OrderType::Market => params.push(("type", "MARKET".to_string())),
        }
        params.push(("quantity", self.quantity.clone()));
        if let Some(price) = &self.price {
            params.push(("price", price.clone()));
        }

        params
    }
}

/// Binance spot REST client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: HttpClient,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    weight_limit: u32,
    usage: Arc<RwLock<Option<RateLimitSnapshot>>>,
}

impl BinanceClient {
    /// Create a new Binance client with default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new client builder
    pub fn builder() -> BinanceClientBuilder {
        BinanceClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn public(&self, path: &str, params: &[(&str, &str)]) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        self.client.send_observed(self.client.get(&url).query(params), |headers| self.record_usage(headers)).await
    }

    /// Send a signed request; the signature covers the exact query string sent
    async fn signed(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Bytes> {
        let credentials = self.credentials.as_ref().ok_or(HttpError::MissingCredentials("signed Binance endpoint"))?;

        let query = signed_query(params, timestamp_ms(), self.recv_window_ms);
        let signature = binance_signature(&credentials.secret_key, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let request = self.client.request(method, &url).header("X-MBX-APIKEY", &credentials.api_key);
        self.client.send_observed(request, |headers| self.record_usage(headers)).await
    }

    fn record_usage(&self, headers: &HeaderMap) {
        match RateLimitSnapshot::from_headers(header_pairs(headers), |_| self.weight_limit) {
            Ok(Some(snapshot)) => *self.usage.write() = Some(snapshot),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "unreadable rate limit header"),
        }
    }
}

impl BinanceApi for BinanceClient {
    async fn ping(&self) -> Result<Bytes> {
        self.public("/api/v3/ping", &[]).await
    }

    async fn server_time(&self) -> Result<Bytes> {
        self.public("/api/v3/time", &[]).await
    }

    async fn exchange_info(&self) -> Result<Bytes> {
        self.public("/api/v3/exchangeInfo", &[]).await
    }

    async fn depth(&self, symbol: &str, limit: u16) -> Result<Bytes> {
        self.public("/api/v3/depth", &[("symbol", symbol), ("limit", &limit.to_string())]).await
    }

    async fn recent_trades(&self, symbol: &str, limit: u16) -> Result<Bytes> {
        self.public("/api/v3/trades", &[("symbol", symbol), ("limit", &limit.min(1000).to_string())]).await
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u16) -> Result<Bytes> {
        self.public("/api/v3/klines", &[("symbol", symbol), ("interval", interval), ("limit", &limit.min(1000).to_string())]).await
    }

    async fn avg_price(&self, symbol: &str) -> Result<Bytes> {
        self.public("/api/v3/avgPrice", &[("symbol", symbol)]).await
    }

    async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Bytes> {
        match symbol {
            Some(symbol) => self.public("/api/v3/ticker/24hr", &[("symbol", symbol)]).await,
            None => self.public("/api/v3/ticker/24hr", &[]).await,
        }
    }

    async fn ticker_price(&self, symbol: Option<&str>) -> Result<Bytes> {
        match symbol {
            Some(symbol) => self.public("/api/v3/ticker/price", &[("symbol", symbol)]).await,
            None => self.public("/api/v3/ticker/price", &[]).await,
        }
    }

    async fn new_order(&self, order: &NewOrder) -> Result<Bytes> {
        self.signed(Method::POST, "/api/v3/order", &order.params()).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Bytes> {
        self.signed(Method::DELETE, "/api/v3/order", &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())]).await
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Bytes> {
        let params: Vec<(&str, String)> = symbol.map(|s| ("symbol", s.to_string())).into_iter().collect();
        self.signed(Method::GET, "/api/v3/openOrders", &params).await
    }

    async fn account(&self) -> Result<Bytes> {
        self.signed(Method::GET, "/api/v3/account", &[]).await
    }

    fn last_usage(&self) -> Option<RateLimitSnapshot> {
        *self.usage.read()
    }
}

/// Builder for configuring Binance client
pub struct BinanceClientBuilder {
    http_config: HttpClientConfig,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    weight_limit: u32,
}

impl Default for BinanceClientBuilder {
    fn default() -> Self {
        Self {
            http_config: HttpClientConfig::default(),
            base_url: BINANCE_BASE_URL.to_string(),
            credentials: None,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            weight_limit: DEFAULT_WEIGHT_LIMIT,
        }
    }
}

impl BinanceClientBuilder {
    /// Use testnet environment
    pub fn testnet(mut self) -> Self {
        self.base_url = BINANCE_TESTNET_URL.to_string();
        self
    }

    /// Set custom base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Configure HTTP client settings
    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Set API credentials for signed endpoints
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Validity window of signed requests
    pub fn recv_window_ms(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Weight limit the used-weight header is measured against
    pub fn weight_limit(mut self, weight_limit: u32) -> Self {
        self.weight_limit = weight_limit;
        self
    }

    /// Build the Binance client
    pub fn build(self) -> Result<BinanceClient> {
        Ok(BinanceClient {
            client: HttpClient::with_config(self.http_config)?,
            base_url: self.base_url,
            credentials: self.credentials,
            recv_window_ms: self.recv_window_ms,
            weight_limit: self.weight_limit,
            usage: Arc::default(),
        })
    }
}

fn signed_query(params: &[(&str, String)], timestamp_ms: u64, recv_window_ms: u64) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, value);
    }
    query.append_pair("recvWindow", &recv_window_ms.to_string());
    query.append_pair("timestamp", &timestamp_ms.to_string());
    query.finish()
}

fn timestamp_ms() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;

    #[test]
    fn test_builder_default() {
        let builder = BinanceClientBuilder::default();
        assert_eq!(builder.base_url, BINANCE_BASE_URL);
        assert_eq!(builder.recv_window_ms, DEFAULT_RECV_WINDOW_MS);
        assert!(builder.credentials.is_none());
    }

    #[test]
    fn test_builder_testnet() {
        let builder = BinanceClientBuilder::default().testnet();
        assert_eq!(builder.base_url, BINANCE_TESTNET_URL);
    }

    #[test]
    fn test_limit_order_params() {
        let order = NewOrder::limit("LTCBTC", Side::Buy, "1", "0.1");
        let query = signed_query(&order.params(), 1499827319559, 5000);

        assert_eq!(query, "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559");
    }

    #[test]
    fn test_market_order_has_no_price() {
        let order = NewOrder::market("BTCUSDT", Side::Sell, "0.01");
        let params = order.params();

        assert!(params.contains(&("type", "MARKET".to_string())));
        assert!(!params.iter().any(|(key, _)| *key == "price" || *key == "timeInForce"));
    }

    #[tokio::test]
    async fn test_signed_endpoint_requires_credentials() {
        let client = BinanceClient::new().unwrap();
        let result = client.account().await;
        assert!(matches!(result, Err(HttpError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn test_used_weight_header_recorded() {
        let server = test_server::answering("HTTP/1.1 200 OK\r\nX-MBX-USED-WEIGHT-1M: 1500\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}");
        let client = BinanceClient::builder().base_url(server.url.clone()).weight_limit(2000).build().unwrap();
        assert!(client.last_usage().is_none());

        assert_eq!(client.ping().await.unwrap(), Bytes::from_static(b"{}"));

        let usage = client.last_usage().unwrap();
        assert_eq!(usage.remaining(), 500);
        assert_eq!(usage.limit(), 2000);
        assert!(server.request().starts_with("GET /api/v3/ping"));
    }

    #[test]
    fn test_timestamp_is_recent() {
        // 2020-09-13 in milliseconds
        assert!(timestamp_ms() > 1_600_000_000_000);
    }
}
