use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use tracing::info;
use tracing::warn;
use xt_app::cli::ProbeArgs;
use xt_app::config_loader::Exchange;
use xt_app::config_loader::ProbeConfig;
use xt_app::config_loader::load_probe_config_or_default;
use xt_app::dry_run::NoopExchange;
use xt_app::probe;
use xt_app::probe::ProbeReport;
use xt_app::tracing_setup;
use xt_http::BinanceApi;
use xt_http::BinanceClient;
use xt_http::BinanceThrottler;
use xt_http::Credentials;
use xt_http::HttpClientConfig;
use xt_http::UpbitApi;
use xt_http::UpbitClient;
use xt_http::UpbitThrottler;
use xt_ratelimit::ThrottleEvent;
use xt_ratelimit::Throttler;

const USAGE_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

fn log_event(event: &ThrottleEvent) {
    warn!(timeframe = %event.timeframe, remaining_rate = event.remaining_rate, remaining_cap = event.remaining_cap, "pipeline below threshold");
}

async fn finish(throttler: &Throttler, report: ProbeReport) {
    info!(succeeded = report.succeeded, failed = report.failed, elapsed_ms = report.elapsed.as_millis() as u64, "probe finished");
    probe::log_snapshot(throttler).await;
}

async fn probe_binance<C: BinanceApi + 'static>(client: C, config: &ProbeConfig) -> anyhow::Result<()> {
    let mut binance = BinanceThrottler::with_throttler(client, config.throttler()?).refund_on_error(config.refund_on_error);
    if let Some(timeout) = config.admission_timeout() {
        binance = binance.admission_timeout(timeout);
    }
    binance.subscribe(log_event);
    let binance = Arc::new(binance);

    let watcher = probe::watch_usage(binance.clone(), config.policy.clone(), USAGE_SAMPLE_PERIOD)?;

    let service = binance.clone();
    let symbol: Arc<str> = Arc::from(config.symbol.as_str());
    let report = probe::drive(config.requests, config.concurrency, move |index| {
        let service = service.clone();
        let symbol = symbol.clone();
        async move {
            // Alternate a heavy and a light endpoint
            if index % 2 == 0 { service.depth(&symbol, 100).await } else { service.ticker_price(Some(&*symbol)).await }
        }
    })
    .await;

    watcher.abort();
    finish(binance.throttler(), report).await;
    Ok(())
}

async fn probe_upbit<C: UpbitApi + 'static>(client: C, config: &ProbeConfig) -> anyhow::Result<()> {
    let mut upbit = UpbitThrottler::with_throttler(client, config.throttler()?).refund_on_error(config.refund_on_error);
    if let Some(timeout) = config.admission_timeout() {
        upbit = upbit.admission_timeout(timeout);
    }
    upbit.subscribe(log_event);
    let upbit = Arc::new(upbit);

    let watcher = probe::watch_usage(upbit.clone(), config.policy.clone(), USAGE_SAMPLE_PERIOD)?;

    let service = upbit.clone();
    let market: Arc<str> = Arc::from(config.symbol.as_str());
    let report = probe::drive(config.requests, config.concurrency, move |index| {
        let service = service.clone();
        let market = market.clone();
        async move {
            let markets = [&*market];
            if index % 2 == 0 { service.ticker(&markets).await } else { service.orderbook(&markets).await }
        }
    })
    .await;

    watcher.abort();
    finish(upbit.throttler(), report).await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ProbeArgs::parse();
    let _ = dotenvy::dotenv();
    let _guard = tracing_setup::init_with_stdout("xt_probe", &args.log_dir, Level::INFO);

    let fallback = args.exchange.unwrap_or(Exchange::Binance);
    let config = args.apply(load_probe_config_or_default(&args.config, fallback));
    info!(
        exchange = %config.exchange,
        symbol = %config.symbol,
        requests = config.requests,
        concurrency = config.concurrency,
        dry_run = args.dry_run,
        "starting probe"
    );

    match (config.exchange, args.dry_run) {
        (Exchange::Binance, true) => probe_binance(NoopExchange::default(), &config).await,
        (Exchange::Binance, false) => {
            let mut builder = BinanceClient::builder().http_config(HttpClientConfig::low_latency());
            if let Some(credentials) = Credentials::from_env("BINANCE_API_KEY", "BINANCE_SECRET_KEY") {
                builder = builder.credentials(credentials);
            }
            let client = builder.build().context("building Binance client")?;
            probe_binance(client, &config).await
        }
        (Exchange::Upbit, true) => probe_upbit(NoopExchange::default(), &config).await,
        (Exchange::Upbit, false) => {
            let mut builder = UpbitClient::builder().http_config(HttpClientConfig::low_latency());
            if let Some(credentials) = Credentials::from_env("UPBIT_ACCESS_KEY", "UPBIT_SECRET_KEY") {
                builder = builder.credentials(credentials);
            }
            let client = builder.build().context("building Upbit client")?;
            probe_upbit(client, &config).await
        }
    }
}
