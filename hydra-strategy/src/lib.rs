#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::expect_used)]

//! The `Strategy` capability-set trait and the order-sink handle strategies
//! use to originate orders.
//!
//! A strategy is a plain Rust value implementing three operations -
//! `build`, `on_open`, `on_close` - none of which take explicit arguments
//! beyond `&mut self`. Whatever a strategy needs to act (a handle onto its
//! portfolio) is handed to it once, in `build`, and is expected to be
//! stored on the strategy's own fields for later use. This mirrors how a
//! registered Python callback closes over its portfolio handle at
//! registration time rather than receiving it on every invocation.

pub mod context;
pub mod error;

pub use context::{OrderSink, StrategyContext};
pub use error::InvalidStrategy;

/// A strategy registered with a Hydra instance.
///
/// `H` is the concrete [`StrategyContext`] implementation a Hydra instance
/// hands out at registration time - ordinarily a small `Clone`-able handle
/// onto the strategy's owning portfolio.
pub trait Strategy<H: StrategyContext>: 'static {
    /// Called exactly once, at `Hydra::build()`, before any step runs.
    ///
    /// Implementations should store `handle` (or whatever subset of it they
    /// need) on their own fields, since `on_open`/`on_close` receive no
    /// arguments. Returning `Err` rejects the strategy at registration time
    /// with [`InvalidStrategy`].
    fn build(&mut self, handle: H) -> Result<(), InvalidStrategy>;

    /// Called once per step, after the exchange publishes the open-phase
    /// row and before the broker's open-phase match.
    fn on_open(&mut self);

    /// Called once per step, after the broker's open-phase match and
    /// before the exchange advances to the close-phase row for the match.
    fn on_close(&mut self);
}
