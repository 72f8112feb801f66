#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::useless_let_if_seq,
    clippy::missing_panics_doc,
    clippy::missing_safety_doc,
    clippy::expect_used
)]

//! Event-driven backtesting engine.
//!
//! A [`Hydra`] owns a set of [`Exchange`]s (each holding [`Asset`] panels
//! merged onto a single clock), a set of [`Broker`]s that match resting
//! orders against that clock's current row, and a tree of [`Portfolio`]s
//! that fills propagate up through. Strategies are registered once, before
//! [`HydraBuilder::build`], and driven by `on_open`/`on_close` callbacks at
//! each step through a [`PortfolioHandle`].

pub mod asset;
pub mod broker;
pub mod error;
pub mod exchange;
pub mod kernel;
pub mod portfolio;
pub mod position;

pub use asset::Asset;
pub use broker::{Broker, MatchOutcome, Order, Phase};
pub use error::{ConfigError, HydraError};
pub use exchange::{Exchange, ExchangeQueryType};
pub use kernel::{Hydra, HydraBuilder, PortfolioHandle};
pub use portfolio::{EventRecord, Portfolio, PortfolioArena, ValueSnapshot};
pub use position::{Position, Trade};
