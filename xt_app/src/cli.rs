use clap::Parser;

use crate::config_loader::Exchange;
use crate::config_loader::ProbeConfig;

/// Fire market data requests through a throttled exchange client and report pipeline usage
#[derive(Debug, Parser)]
#[command(name = "xt_probe", version)]
pub struct ProbeArgs {
    /// Throttle profile (TOML)
    #[arg(long, default_value = "xt_app/config/binance.toml")]
    pub config: String,

    /// Exchange to probe, overrides the profile
    #[arg(long, value_enum)]
    pub exchange: Option<Exchange>,

    /// Market symbol, e.g. BTCUSDT or KRW-BTC
    #[arg(long)]
    pub symbol: Option<String>,

    /// Total number of requests
    #[arg(long)]
    pub requests: Option<usize>,

    /// Number of concurrent tasks sharing the throttler
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Use a client that never touches the network
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "XT_LOG_DIR", default_value = "logs")]
    pub log_dir: String,
}

impl ProbeArgs {
    /// Apply command-line overrides on top of a loaded profile
    pub fn apply(&self, mut config: ProbeConfig) -> ProbeConfig {
        if let Some(exchange) = self.exchange {
            if exchange != config.exchange && self.symbol.is_none() {
                config.symbol = exchange.default_symbol().to_string();
            }
            config.exchange = exchange;
        }
        if let Some(symbol) = &self.symbol {
            config.symbol = symbol.to_uppercase();
        }
        if let Some(requests) = self.requests {
            config.requests = requests;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        config
    }
}
