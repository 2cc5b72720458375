use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use reqwest::ClientBuilder;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::header::ACCEPT;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;

use crate::errors::HttpError;
use crate::errors::Result;

/// Connection settings shared by the exchange clients
///
/// Exchange REST APIs answer small JSON bodies, so the defaults favour a warm
/// pool and short connect times over throughput.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub connect_timeout: Duration,

    /// Whole-request deadline, measured after admission
    pub request_timeout: Duration,

    pub tcp_keepalive: Duration,
    pub tcp_nodelay: bool,
    pub hickory_dns: bool,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 16,
            pool_idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
            hickory_dns: true,
            user_agent: concat!("xt_http/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientConfig {
    /// Tighter deadlines for latency-sensitive callers
    pub fn low_latency() -> Self {
        Self {
            pool_max_idle_per_host: 8,
            pool_idle_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            tcp_keepalive: Duration::from_secs(30),
            ..Default::default()
        }
    }
}

/// Pooled HTTP client shared by the exchange clients
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_nodelay(config.tcp_nodelay)
            .tcp_keepalive(Some(config.tcp_keepalive))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .hickory_dns(config.hickory_dns)
            .user_agent(config.user_agent.clone())
            .default_headers(json_headers())
            .gzip(true)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request and return the raw body, mapping non-2xx responses to [`HttpError::Api`]
    pub async fn send_raw(&self, request: RequestBuilder) -> Result<Bytes> {
        self.send_observed(request, |_| {}).await
    }

    /// Like [`HttpClient::send_raw`], handing the response headers to `observe`
    /// before the status is checked, so rejections are observed too
    pub async fn send_observed<F>(&self, request: RequestBuilder, observe: F) -> Result<Bytes>
    where
        F: FnOnce(&HeaderMap) + Send,
    {
        let response = request.send().await?;
        observe(response.headers());

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(HttpError::Api { status: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() });
        }

        Ok(body)
    }
}

/// Header `(name, value)` pairs, skipping values that are not visible ASCII
pub fn header_pairs(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers.iter().filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}
