#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::missing_panics_doc,
    clippy::missing_safety_doc,
    clippy::expect_used
)]

//! Identifier types and data-loading errors shared by every Hydra crate.
//!
//! This crate has no knowledge of simulation mechanics - it only defines the
//! string-backed ids that name assets, exchanges, brokers, portfolios and
//! strategies, the monotonic ids for orders and trades, and the error type
//! an [`Asset`](https://docs.rs/hydra) implementation returns when it is fed
//! malformed tabular data.

pub mod error;
pub mod ids;
pub mod order;

pub use error::DataError;
pub use ids::{AssetId, BrokerId, ExchangeId, OrderId, PortfolioId, StrategyId, TradeId};
pub use order::{ExecutionType, OrderState, OrderType, RejectReason, TargetSize};
