use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;
use url::form_urlencoded;
use xt_ratelimit::RateLimitSnapshot;
use xt_ratelimit::exchanges::upbit::UpbitCategory;
use xt_ratelimit::exchanges::upbit::UpbitLimits;

use crate::auth::upbit_token;
use crate::auth::Credentials;
use crate::client::HttpClient;
use crate::client::HttpClientConfig;
use crate::client::header_pairs;
use crate::errors::HttpError;
use crate::errors::Result;

const UPBIT_BASE_URL: &str = "https://api.upbit.com";

/// Upbit REST endpoints, returning raw response bodies
pub trait UpbitApi: Send + Sync {
    fn markets(&self) -> impl Future<Output = Result<Bytes>> + Send;

    fn ticker(&self, markets: &[&str]) -> impl Future<Output = Result<Bytes>> + Send;

    fn orderbook(&self, markets: &[&str]) -> impl Future<Output = Result<Bytes>> + Send;

    /// Minute candles; `unit` is one of 1, 3, 5, 10, 15, 30, 60 or 240
    fn candles_minutes(&self, unit: u16, market: &str, count: u16) -> impl Future<Output = Result<Bytes>> + Send;

    fn accounts(&self) -> impl Future<Output = Result<Bytes>> + Send;

    fn order(&self, uuid: &str) -> impl Future<Output = Result<Bytes>> + Send;

    fn place_order(&self, order: &UpbitOrder) -> impl Future<Output = Result<Bytes>> + Send;

    fn cancel_order(&self, uuid: &str) -> impl Future<Output = Result<Bytes>> + Send;

    /// Per-second budget left in the group of the latest response, if tracked
    fn last_usage(&self) -> Option<RateLimitSnapshot> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpbitSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpbitOrderType {
    /// Limit order, needs volume and price
    Limit,
    /// Market buy for a quote amount, needs price only
    Price,
    /// Market sell of a volume, needs volume only
    Market,
}

/// Order placement request with decimal strings for volume and price
#[derive(Debug, Clone, PartialEq)]
pub struct UpbitOrder {
    pub market: String,
    pub side: UpbitSide,
    pub ord_type: UpbitOrderType,
    pub volume: Option<String>,
    pub price: Option<String>,
}

impl UpbitOrder {
    pub fn limit(market: impl Into<String>, side: UpbitSide, volume: impl Into<String>, price: impl Into<String>) -> Self {
        Self { market: market.into(), side, ord_type: UpbitOrderType::Limit, volume: Some(volume.into()), price: Some(price.into()) }
    }

    pub fn market_buy(market: impl Into<String>, quote_amount: impl Into<String>) -> Self {
        Self { market: market.into(), side: UpbitSide::Bid, ord_type: UpbitOrderType::Price, volume: None, price: Some(quote_amount.into()) }
    }

    pub fn market_sell(market: impl Into<String>, volume: impl Into<String>) -> Self {
        Self { market: market.into(), side: UpbitSide::Ask, ord_type: UpbitOrderType::Market, volume: Some(volume.into()), price: None }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let side = match self.side {
            UpbitSide::Bid => "bid",
            UpbitSide::Ask => "ask",
        };
        let ord_type = match self.ord_type {
            UpbitOrderType::Limit => "limit",
            UpbitOrderType::Price => "price",
            UpbitOrderType::Market => "market",
        };

        let mut params = vec![("market", self.market.clone()), ("side", side.to_string())];
        if let Some(volume) = &self.volume {
            params.push(("volume", volume.clone()));
        }
        if let Some(price) = &self.price {
            params.push(("price", price.clone()));
        }
        params.push(("ord_type", ord_type.to_string()));
        params
    }
}

/// Upbit REST client
#[derive(Debug, Clone)]
pub struct UpbitClient {
    client: HttpClient,
    base_url: String,
    credentials: Option<Credentials>,
    limits: UpbitLimits,
    usage: Arc<RwLock<Option<RateLimitSnapshot>>>,
}

impl UpbitClient {
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> UpbitClientBuilder {
        UpbitClientBuilder::default()
    }

    async fn public(&self, path: &str, params: &[(&str, String)]) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        self.client.send_observed(self.client.get(&url).query(params), |headers| self.record_usage(headers)).await
    }

    /// Authenticated request; the token's query hash covers the parameters
    /// whether they travel in the URL or in a JSON body
    async fn private(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<Bytes> {
        let credentials = self.credentials.as_ref().ok_or(HttpError::MissingCredentials("private Upbit endpoint"))?;

        let query = (!params.is_empty()).then(|| encode_query(params));
        let token = upbit_token(credentials, query.as_deref())?;
        let url = format!("{}{}", self.base_url, path);

        let request = if method == Method::POST {
            let body: Map<String, Value> = params.iter().map(|(key, value)| (key.to_string(), Value::String(value.clone()))).collect();
            self.client.request(method, &url).json(&body)
        } else {
            match &query {
                Some(query) => self.client.request(method, &format!("{url}?{query}")),
                None => self.client.request(method, &url),
            }
        };

        self.client.send_observed(request.bearer_auth(token), |headers| self.record_usage(headers)).await
    }

    fn record_usage(&self, headers: &HeaderMap) {
        let limit_for = |group: &str| self.limits.limit_for(UpbitCategory::from_group(group)).per_second;
        match RateLimitSnapshot::from_headers(header_pairs(headers), limit_for) {
            Ok(Some(snapshot)) => *self.usage.write() = Some(snapshot),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "unreadable Remaining-Req header"),
        }
    }
}

impl UpbitApi for UpbitClient {
    async fn markets(&self) -> Result<Bytes> {
        self.public("/v1/market/all", &[]).await
    }

    async fn ticker(&self, markets: &[&str]) -> Result<Bytes> {
        self.public("/v1/ticker", &[("markets", markets.join(","))]).await
    }

    async fn orderbook(&self, markets: &[&str]) -> Result<Bytes> {
        self.public("/v1/orderbook", &[("markets", markets.join(","))]).await
    }

    async fn candles_minutes(&self, unit: u16, market: &str, count: u16) -> Result<Bytes> {
        let path = format!("/v1/candles/minutes/{unit}");
        self.public(&path, &[("market", market.to_string()), ("count", count.min(200).to_string())]).await
    }

    async fn accounts(&self) -> Result<Bytes> {
        self.private(Method::GET, "/v1/accounts", &[]).await
    }

    async fn order(&self, uuid: &str) -> Result<Bytes> {
        self.private(Method::GET, "/v1/order", &[("uuid", uuid.to_string())]).await
    }

    async fn place_order(&self, order: &UpbitOrder) -> Result<Bytes> {
        self.private(Method::POST, "/v1/orders", &order.params()).await
    }

    async fn cancel_order(&self, uuid: &str) -> Result<Bytes> {
        self.private(Method::DELETE, "/v1/order", &[("uuid", uuid.to_string())]).await
    }

    fn last_usage(&self) -> Option<RateLimitSnapshot> {
        *self.usage.read()
    }
}

/// Builder for configuring Upbit client
pub struct UpbitClientBuilder {
    http_config: HttpClientConfig,
    base_url: String,
    credentials: Option<Credentials>,
    limits: UpbitLimits,
}

impl Default for UpbitClientBuilder {
    fn default() -> Self {
        Self { http_config: HttpClientConfig::default(), base_url: UPBIT_BASE_URL.to_string(), credentials: None, limits: UpbitLimits::default() }
    }
}

impl UpbitClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Access and secret key for private endpoints
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Limits the Remaining-Req header is measured against
    pub fn limits(mut self, limits: UpbitLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> Result<UpbitClient> {
        Ok(UpbitClient {
            client: HttpClient::with_config(self.http_config)?,
            base_url: self.base_url,
            credentials: self.credentials,
            limits: self.limits,
            usage: Arc::default(),
        })
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, value);
    }
    query.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;

    #[test]
    fn test_limit_order_query() {
        let order = UpbitOrder::limit("KRW-BTC", UpbitSide::Bid, "0.01", "100000000");
        assert_eq!(encode_query(&order.params()), "market=KRW-BTC&side=bid&volume=0.01&price=100000000&ord_type=limit");
    }

    #[test]
    fn test_market_orders_omit_unused_fields() {
        let buy = encode_query(&UpbitOrder::market_buy("KRW-ETH", "5000").params());
        assert_eq!(buy, "market=KRW-ETH&side=bid&price=5000&ord_type=price");

        let sell = encode_query(&UpbitOrder::market_sell("KRW-ETH", "1.5").params());
        assert_eq!(sell, "market=KRW-ETH&side=ask&volume=1.5&ord_type=market");
    }

    #[tokio::test]
    async fn test_private_endpoint_requires_credentials() {
        let client = UpbitClient::new().unwrap();
        assert!(matches!(client.accounts().await, Err(HttpError::MissingCredentials(_))));
        assert!(matches!(client.cancel_order("abc").await, Err(HttpError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn test_remaining_req_recorded_against_group_limit() {
        let server = test_server::answering("HTTP/1.1 200 OK\r\nRemaining-Req: group=order; min=199; sec=6\r\ncontent-length: 2\r\nconnection: close\r\n\r\n[]");
        let client = UpbitClient::builder().base_url(server.url.clone()).build().unwrap();

        client.markets().await.unwrap();

        let usage = client.last_usage().unwrap();
        assert_eq!(usage.remaining(), 6);
        assert_eq!(usage.limit(), 8);
        assert!(usage.reset_at().is_some());
        assert!(server.request().starts_with("GET /v1/market/all"));
    }
}
