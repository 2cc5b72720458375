use std::fmt;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use config::Config;
use config::ConfigError;
use config::File;
use serde::Deserialize;
use xt_ratelimit::exchanges::binance::BinanceLimits;
use xt_ratelimit::exchanges::upbit::UpbitLimits;
use xt_ratelimit::PipelineDescriptor;
use xt_ratelimit::ThrottlePolicy;
use xt_ratelimit::Throttler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Upbit,
}

impl Exchange {
    pub fn default_symbol(self) -> &'static str {
        match self {
            Exchange::Binance => "BTCUSDT",
            Exchange::Upbit => "KRW-BTC",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Binance => f.write_str("binance"),
            Exchange::Upbit => f.write_str("upbit"),
        }
    }
}

/// Throttle profile for one probe run
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub exchange: Exchange,
    pub symbol: String,

    #[serde(default = "default_requests")]
    pub requests: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Custom pipelines; empty means the exchange's published limits
    #[serde(default)]
    pub pipelines: Vec<PipelineDescriptor>,

    #[serde(default)]
    pub policy: ThrottlePolicy,

    #[serde(default)]
    pub refund_on_error: bool,

    pub admission_timeout_ms: Option<u64>,
}

fn default_requests() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

impl ProbeConfig {
    pub fn default_for(exchange: Exchange) -> Self {
        Self {
            exchange,
            symbol: exchange.default_symbol().to_string(),
            requests: default_requests(),
            concurrency: default_concurrency(),
            pipelines: Vec::new(),
            policy: ThrottlePolicy::default(),
            refund_on_error: false,
            admission_timeout_ms: None,
        }
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout_ms.map(Duration::from_millis)
    }

    /// Build the throttler this profile describes
    pub fn throttler(&self) -> xt_ratelimit::Result<Throttler> {
        self.policy.validate()?;

        if !self.pipelines.is_empty() {
            return Throttler::from_descriptors(&self.pipelines);
        }

        match self.exchange {
            Exchange::Binance => BinanceLimits::default().throttler(),
            Exchange::Upbit => UpbitLimits::default().throttler(),
        }
    }
}

pub fn load_probe_config<P: AsRef<Path>>(path: P) -> Result<ProbeConfig, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;

    config.try_deserialize()
}

/// Load a probe profile with fallback to the exchange defaults
pub fn load_probe_config_or_default(path: &str, exchange: Exchange) -> ProbeConfig {
    match load_probe_config(path) {
        Ok(config) => {
            tracing::info!("Loaded probe config from {path}");
            config
        }
        Err(err) => {
            tracing::warn!("Failed to load probe config from {}: {}. Using {} defaults.", path, err, exchange);
            ProbeConfig::default_for(exchange)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_profile(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("xt_app_{}_{name}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_profile_with_pipelines() {
        let path = write_profile(
            "pipelines",
            r#"
exchange = "binance"
symbol = "ETHUSDT"
requests = 50
refund_on_error = true
admission_timeout_ms = 2500

[policy]
threshold = 0.7

[[pipelines]]
timeframe = "weight:1m"
threshold = 0.25
window = { limit = 1200, interval_seconds = 60.0, window_type = "fixed" }

[[pipelines]]
timeframe = "burst:1s"
window = { limit = 20, interval_seconds = 1.0, window_type = "sliding", max_soft_delay_ms = 100 }
"#,
        );

        let config = load_probe_config(&path).unwrap();
        assert_eq!(config.exchange, Exchange::Binance);
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.requests, 50);
        assert_eq!(config.concurrency, 4);
        assert!(config.refund_on_error);
        assert_eq!(config.admission_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.policy.threshold, 0.7);
        assert_eq!(config.policy.history_size, ThrottlePolicy::default().history_size);

        let throttler = config.throttler().unwrap();
        assert_eq!(throttler.timeframes(), ["weight:1m", "burst:1s"]);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_empty_pipelines_use_exchange_topology() {
        let throttler = ProbeConfig::default_for(Exchange::Upbit).throttler().unwrap();
        assert_eq!(throttler.timeframes().len(), 6);

        let throttler = ProbeConfig::default_for(Exchange::Binance).throttler().unwrap();
        assert_eq!(throttler.timeframes(), ["weight:1m", "raw:5m", "orders:10s"]);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut config = ProbeConfig::default_for(Exchange::Binance);
        config.policy.threshold = 1.5;
        assert!(config.throttler().is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_probe_config_or_default("/nonexistent/xt_probe.toml", Exchange::Upbit);
        assert_eq!(config.exchange, Exchange::Upbit);
        assert_eq!(config.symbol, "KRW-BTC");
        assert!(config.pipelines.is_empty());
    }
}
