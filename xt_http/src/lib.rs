pub mod auth;
pub mod binance;
pub mod client;
pub mod errors;
pub mod throttled;
pub mod upbit;

#[cfg(test)]
mod test_server;

pub use auth::Credentials;
pub use binance::BinanceApi;
pub use binance::BinanceClient;
pub use binance::NewOrder;
pub use client::HttpClient;
pub use client::HttpClientConfig;
pub use errors::HttpError;
pub use errors::Result;
pub use throttled::BinanceThrottler;
pub use throttled::UpbitThrottler;
pub use upbit::UpbitApi;
pub use upbit::UpbitClient;
pub use upbit::UpbitOrder;
