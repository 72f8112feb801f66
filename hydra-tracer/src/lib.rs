#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::expect_used)]

//! Rolling-window statistics backing Hydra's `VOLATILITY` and `BETA`
//! feature tracers.
//!
//! Both trackers are plain ring-buffer accumulators over a fixed window of
//! simple returns - no simulation state lives here, only the incremental
//! sum / sum-of-squares bookkeeping an `Asset` or `Exchange` tracer wraps.
//! Structured the way `SimpleMovingAverage`/`ExponentialMovingAverage`
//! accumulate a running sum over a `VecDeque`, generalised to also track
//! sum-of-squares (variance) and cross-products (covariance).

pub mod error;
pub mod rolling;

pub use error::TracerError;
pub use rolling::{RollingBeta, RollingVariance};
