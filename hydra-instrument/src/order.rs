use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The only order type Hydra matches. Kept as an enum (rather than a unit
/// struct) so a future execution model can add variants without breaking
/// the public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
}

/// Determines which matching point within a step an order is eligible to
/// fill at.
///
/// `Eager` orders match at whichever matching pass - open-phase or
/// close-phase - comes next after submission, even on the same step:
/// placed during `on_open`, they fill at that step's open-phase pass
/// against the open price; placed during `on_close`, they fill at that
/// same step's close-phase pass against the close price. `Lazy` orders
/// always defer to the open-phase pass of a later step, regardless of
/// which phase they were submitted during.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionType {
    Eager,
    Lazy,
}

/// Lifecycle state of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

/// The units conversion mode for [`order_target_size`](OrderSink) calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetSize {
    /// Target expressed directly in units of the underlying asset.
    Units(Decimal),
    /// Target expressed in notional currency, converted to units at the
    /// observed fill price.
    Dollars(Decimal),
    /// Target expressed as a percentage of the owning portfolio's NLV,
    /// converted to units at the observed fill price.
    Pct(Decimal),
}

/// Non-raising reasons a [`Broker`] can refuse to fill an order. These are
/// recorded on the owning portfolio's `EVENT` tracer; they never abort the
/// simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    AssetInactive,
    PriceUnavailable,
    InsufficientExchange,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AssetInactive => write!(f, "asset is not in the exchange's active set"),
            RejectReason::PriceUnavailable => write!(f, "fill price column unavailable for the current row"),
            RejectReason::InsufficientExchange => write!(f, "exchange could not resolve the requested instrument"),
        }
    }
}
