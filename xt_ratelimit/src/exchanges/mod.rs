//! Pipeline topologies and endpoint costs for supported exchanges
//!
//! - **Binance**: one weight budget shared by every endpoint, plus raw request
//!   and order placement counters
//! - **Upbit**: independent budgets per request category, each bounded by a
//!   per-second and a per-minute window

pub mod binance;
pub mod upbit;
