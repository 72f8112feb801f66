use hydra_instrument::{AssetId, ExecutionType, PortfolioId, TargetSize};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Order-origination operations available to a strategy once it holds a
/// handle onto its portfolio.
///
/// Every method buffers a request rather than matching immediately - per
/// the single-threaded cooperative kernel, orders submitted from a
/// callback are only visible to the broker at the next matching point.
pub trait OrderSink {
    fn place_market_order(&mut self, asset_id: AssetId, units: Decimal, execution: ExecutionType);

    fn order_target_size(&mut self, asset_id: AssetId, target: TargetSize, execution: ExecutionType);

    /// Submits one order per entry of `allocations`, plus an implicit
    /// zero-target order for every currently-held asset absent from the
    /// map (liquidating it). Entries are submitted in asset_id
    /// lexicographic order for deterministic replay.
    fn order_target_allocations(&mut self, allocations: BTreeMap<AssetId, Decimal>, execution: ExecutionType);

    fn close_position(&mut self, asset_id: AssetId, execution: ExecutionType);
}

/// The full set of capabilities a Hydra instance exposes to a registered
/// strategy: order origination plus read-only queries onto its own
/// portfolio's current state.
pub trait StrategyContext: OrderSink + Clone + 'static {
    fn portfolio_id(&self) -> &PortfolioId;

    /// Signed position size in `asset_id`, or zero if no position is open.
    fn position_units(&self, asset_id: &AssetId) -> Decimal;

    fn cash(&self) -> Decimal;

    fn nlv(&self) -> Decimal;
}
