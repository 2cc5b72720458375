//! Rate limit state reported by an exchange in its response headers

use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConfigError;
use crate::error::Result;

/// Binance reports the weight used in the current minute in this header
pub const BINANCE_USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";

/// Upbit reports the remaining requests of the call's group in this header
pub const UPBIT_REMAINING_REQ_HEADER: &str = "remaining-req";

/// Server-side view of one limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSnapshot {
    remaining: u32,
    limit: u32,
    reset_at: Option<Instant>,
}

impl RateLimitSnapshot {
    pub fn new(remaining: u32, limit: u32, reset_at: Option<Instant>) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if remaining > limit {
            return Err(ConfigError::RemainingExceedsLimit { remaining, limit });
        }
        Ok(Self { remaining, limit, reset_at })
    }

    /// Parse Binance's used-weight header against the account's weight limit.
    ///
    /// Used weight can exceed the limit while the IP is being rejected, in
    /// which case nothing remains.
    pub fn from_binance_used_weight(value: &str, limit: u32) -> Result<Self> {
        let used: u32 = value.trim().parse().map_err(|_| invalid(BINANCE_USED_WEIGHT_HEADER, value))?;
        Self::new(limit.saturating_sub(used), limit, None)
    }

    /// Parse Upbit's `Remaining-Req` header (`group=default; min=1799; sec=29`).
    ///
    /// Returns the request group and a snapshot of its per-second budget,
    /// which resets within a second.
    pub fn from_upbit_remaining_req(value: &str, limit_per_sec: u32) -> Result<(String, Self)> {
        let (group, sec) = parse_remaining_req(value)?;
        Ok((group, Self::upbit_per_second(sec, limit_per_sec)?))
    }

    /// Snapshot from response headers given as `(name, value)` pairs.
    ///
    /// Header names match case-insensitively. `limit_for` supplies the limit the
    /// reported count is measured against: it receives `"weight"` for Binance's
    /// used weight and the request group for Upbit. `None` when the response
    /// carries neither header.
    pub fn from_headers<'a, I, L>(headers: I, limit_for: L) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
        L: Fn(&str) -> u32,
    {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(BINANCE_USED_WEIGHT_HEADER) {
                return Self::from_binance_used_weight(value, limit_for("weight")).map(Some);
            }
            if name.eq_ignore_ascii_case(UPBIT_REMAINING_REQ_HEADER) {
                let (group, sec) = parse_remaining_req(value)?;
                return Self::upbit_per_second(sec, limit_for(&group)).map(Some);
            }
        }
        Ok(None)
    }

    fn upbit_per_second(sec: u32, limit_per_sec: u32) -> Result<Self> {
        Self::new(sec.min(limit_per_sec), limit_per_sec, Some(Instant::now() + Duration::from_secs(1)))
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn reset_at(&self) -> Option<Instant> {
        self.reset_at
    }

    /// Fraction of the limit already spent
    pub fn usage_ratio(&self) -> f64 {
        1.0 - self.remaining_ratio()
    }

    pub fn remaining_ratio(&self) -> f64 {
        self.remaining as f64 / self.limit as f64
    }
}

fn parse_remaining_req(value: &str) -> Result<(String, u32)> {
    let mut group = None;
    let mut sec = None;

    for part in value.split(';') {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "group" => group = Some(val.trim().to_string()),
            "sec" => sec = val.trim().parse::<u32>().ok(),
            _ => {}
        }
    }

    match (group, sec) {
        (Some(group), Some(sec)) => Ok((group, sec)),
        _ => Err(invalid(UPBIT_REMAINING_REQ_HEADER, value)),
    }
}

fn invalid(header: &str, value: &str) -> ConfigError {
    ConfigError::InvalidHeader { header: header.to_string(), value: value.to_string() }
}
