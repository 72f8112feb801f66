use crate::error::ConfigError;
use crate::position::{Position, Trade};
use hydra_instrument::{AssetId, OrderId, PortfolioId, StrategyId, TargetSize, TradeId};
use indexmap::IndexMap;
use rust_decimal::Decimal;

/// One entry of a portfolio's append-only `EVENT` tracer: every order
/// transition a portfolio's positions were party to.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Submitted { order_id: OrderId, asset_id: AssetId, units: Decimal, strategy_id: StrategyId },
    Filled { order_id: OrderId, trade_id: TradeId, asset_id: AssetId, units: Decimal, fill_price: Decimal },
    Rejected { order_id: OrderId, asset_id: AssetId, reason: String },
    Cancelled { order_id: OrderId, asset_id: AssetId },
}

/// One sample of a portfolio's `VALUE` tracer: net liquidation value and
/// cash, taken twice per step (forward pass and backward pass).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueSnapshot {
    pub timestamp: Option<i64>,
    pub nlv: Decimal,
    pub cash: Decimal,
}

/// A node in the portfolio tree: cash, a map of open/closed positions, and
/// the two tracers (`VALUE`, `EVENT`) a portfolio owns directly.
pub struct Portfolio {
    pub portfolio_id: PortfolioId,
    pub parent: Option<PortfolioId>,
    pub children: Vec<PortfolioId>,
    pub cash: Decimal,
    pub positions: IndexMap<AssetId, Position>,
    pub value_history: Vec<ValueSnapshot>,
    pub events: Vec<EventRecord>,
}

impl Portfolio {
    fn new(portfolio_id: PortfolioId, parent: Option<PortfolioId>, cash: Decimal) -> Self {
        Self {
            portfolio_id,
            parent,
            children: Vec::new(),
            cash,
            positions: IndexMap::new(),
            value_history: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn position_units(&self, asset_id: &AssetId) -> Decimal {
        self.positions.get(asset_id).map(|p| p.units).unwrap_or(Decimal::ZERO)
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn nlv(&self) -> Decimal {
        self.cash + self.positions.values().map(|p| p.nlv()).sum::<Decimal>()
    }
}

/// Owns every [`Portfolio`] in the tree by integer-stable string id,
/// avoiding cyclic `Rc`-ownership between parent and child nodes - a
/// portfolio only ever refers to relatives by [`PortfolioId`], resolved
/// back through this arena.
pub struct PortfolioArena {
    portfolios: IndexMap<PortfolioId, Portfolio>,
    master_id: PortfolioId,
    /// Cash each portfolio was created with, kept so `reset` can restore
    /// it without having to undo every fill it has seen since. Only a
    /// leaf's entry is ever read back directly - a portfolio that
    /// acquires a child stops holding its own cash and is recomputed by
    /// `rollup_cash` from then on, so its stored initial value is inert.
    initial_cash: IndexMap<PortfolioId, Decimal>,
}

pub const MASTER_PORTFOLIO_ID: &str = "master";

impl PortfolioArena {
    pub fn new(master_cash: Decimal) -> Self {
        let master_id = PortfolioId::from(MASTER_PORTFOLIO_ID);
        let mut portfolios = IndexMap::new();
        portfolios.insert(master_id.clone(), Portfolio::new(master_id.clone(), None, master_cash));
        let mut initial_cash = IndexMap::new();
        initial_cash.insert(master_id.clone(), master_cash);
        Self { portfolios, master_id, initial_cash }
    }

    pub fn master_id(&self) -> &PortfolioId {
        &self.master_id
    }

    pub fn get(&self, id: &PortfolioId) -> Option<&Portfolio> {
        self.portfolios.get(id)
    }

    pub fn get_mut(&mut self, id: &PortfolioId) -> Option<&mut Portfolio> {
        self.portfolios.get_mut(id)
    }

    pub fn create_sub_portfolio(&mut self, portfolio_id: PortfolioId, parent_id: &PortfolioId, cash: Decimal) -> Result<(), ConfigError> {
        if self.portfolios.contains_key(&portfolio_id) {
            return Err(ConfigError::DuplicateId(portfolio_id.as_str().to_string()));
        }
        if !self.portfolios.contains_key(parent_id) {
            return Err(ConfigError::UnknownPortfolio(parent_id.as_str().to_string()));
        }

        self.portfolios.insert(portfolio_id.clone(), Portfolio::new(portfolio_id.clone(), Some(parent_id.clone()), cash));
        self.portfolios[parent_id].children.push(portfolio_id.clone());
        self.initial_cash.insert(portfolio_id, cash);
        Ok(())
    }

    /// Returns every portfolio's cash and positions to the post-build
    /// initial state. `clear_history` additionally empties the `VALUE` and
    /// `EVENT` tracers, re-seeding `VALUE` with the same zero-position
    /// snapshot `build()` takes; when `false` they keep accumulating across
    /// the reset boundary.
    pub fn reset(&mut self, clear_history: bool) {
        for (portfolio_id, portfolio) in self.portfolios.iter_mut() {
            portfolio.positions.clear();
            portfolio.cash = self.initial_cash.get(portfolio_id).copied().unwrap_or(Decimal::ZERO);
            if clear_history {
                portfolio.value_history.clear();
                portfolio.events.clear();
            }
        }
        self.rollup_cash();
        if clear_history {
            self.seed_value_history();
        }
    }

    /// Appends one zero-position `VALUE` snapshot per portfolio, taken
    /// before any step has run. `VALUE` history length is therefore
    /// `2 * steps_run + 1` relative to this seed.
    pub fn seed_value_history(&mut self) {
        for portfolio in self.portfolios.values_mut() {
            let snapshot = ValueSnapshot { timestamp: None, nlv: portfolio.nlv(), cash: portfolio.cash };
            portfolio.value_history.push(snapshot);
        }
    }

    /// Applies a fill of `units` at `fill_price` to `portfolio_id`'s
    /// position in `asset_id`, then walks up through every ancestor
    /// applying the identical fill rules to their aggregated position,
    /// chaining each ancestor's recorded [`Trade`] to the child's via
    /// `parent_trade_id`. Returns the ids of every trade recorded,
    /// originating portfolio first.
    ///
    /// Cash only ever moves on the originating portfolio's own ledger -
    /// every ancestor's cash is a pure rollup of its children's, kept
    /// current here rather than seeded independently, so `A.cash == Σ
    /// leaves(A).cash` holds for every non-leaf `A` by construction.
    #[allow(clippy::too_many_arguments)]
    pub fn propagate_fill(
        &mut self,
        portfolio_id: &PortfolioId,
        asset_id: &AssetId,
        units: Decimal,
        fill_price: Decimal,
        fill_time: i64,
        strategy_id: &StrategyId,
        order_id: OrderId,
        broker_id: &hydra_instrument::BrokerId,
        trade_ids: &hydra_instrument::ids::IdSequence,
    ) -> Result<Vec<TradeId>, ConfigError> {
        let mut recorded = Vec::new();
        let mut parent_trade_id = None;
        let mut current_id = Some(portfolio_id.clone());
        let mut is_origin = true;

        while let Some(id) = current_id {
            let (parent_id, children) = {
                let portfolio = self.portfolios.get_mut(&id).ok_or_else(|| ConfigError::UnknownPortfolio(id.as_str().to_string()))?;

                let trade_id = TradeId(trade_ids.next());
                let trade = Trade {
                    trade_id,
                    asset_id: asset_id.clone(),
                    units,
                    fill_price,
                    fill_time,
                    strategy_id: strategy_id.clone(),
                    order_id,
                    broker_id: broker_id.clone(),
                    parent_trade_id,
                };

                let position = portfolio.positions.entry(asset_id.clone()).or_insert_with(|| Position::new(asset_id.clone()));
                let cash_delta = position.apply_fill(units, fill_price, trade);
                if is_origin {
                    portfolio.cash += cash_delta;
                }

                recorded.push(trade_id);
                parent_trade_id = Some(trade_id);
                (portfolio.parent.clone(), portfolio.children.clone())
            };

            if !is_origin {
                let rolled: Decimal = children.iter().map(|child_id| self.portfolios[child_id].cash).sum();
                self.portfolios.get_mut(&id).unwrap().cash = rolled;
            }

            current_id = parent_id;
            is_origin = false;
        }

        Ok(recorded)
    }

    /// Recomputes every non-leaf portfolio's cash as the sum of its
    /// children's cash, bottom-up. A leaf's cash is its own independently
    /// held ledger and is left untouched.
    pub fn rollup_cash(&mut self) {
        let master_id = self.master_id.clone();
        self.rollup_cash_for(&master_id);
    }

    fn rollup_cash_for(&mut self, portfolio_id: &PortfolioId) -> Decimal {
        let children = self.portfolios[portfolio_id].children.clone();
        if children.is_empty() {
            return self.portfolios[portfolio_id].cash;
        }
        let total: Decimal = children.iter().map(|child_id| self.rollup_cash_for(child_id)).sum();
        self.portfolios.get_mut(portfolio_id).unwrap().cash = total;
        total
    }

    /// Marks every position at `price` across the whole tree and appends a
    /// [`ValueSnapshot`] to every portfolio's `VALUE` tracer. Cash is kept
    /// rolled up as fills land (see `propagate_fill`), so no recomputation
    /// happens here.
    pub fn evaluate(&mut self, prices: &std::collections::HashMap<AssetId, Decimal>, timestamp: Option<i64>) {
        for portfolio in self.portfolios.values_mut() {
            for (asset_id, position) in portfolio.positions.iter_mut() {
                if let Some(price) = prices.get(asset_id) {
                    position.evaluate(*price);
                }
            }
        }

        for portfolio_id in self.portfolios.keys().cloned().collect::<Vec<_>>() {
            let portfolio = &self.portfolios[&portfolio_id];
            let snapshot = ValueSnapshot { timestamp, nlv: portfolio.nlv(), cash: portfolio.cash };
            self.portfolios.get_mut(&portfolio_id).unwrap().value_history.push(snapshot);
        }

        #[cfg(debug_assertions)]
        self.assert_aggregate_invariants();
    }

    /// Checked only in debug builds: every non-leaf portfolio's position in
    /// each asset equals the sum of its children's positions in that
    /// asset, and its cash equals the sum of its leaves' cash. The
    /// aggregate is the invariant, not a cache - this exists to catch a
    /// `propagate_fill` bug the moment it happens rather than downstream.
    #[cfg(debug_assertions)]
    fn assert_aggregate_invariants(&self) {
        for portfolio in self.portfolios.values() {
            if portfolio.children.is_empty() {
                continue;
            }

            let mut child_units: std::collections::HashMap<&AssetId, Decimal> = std::collections::HashMap::new();
            let mut child_cash = Decimal::ZERO;
            for child_id in &portfolio.children {
                let child = &self.portfolios[child_id];
                child_cash += self.leaf_cash_sum(child_id);
                for (asset_id, position) in &child.positions {
                    *child_units.entry(asset_id).or_insert(Decimal::ZERO) += position.units;
                }
            }

            for (asset_id, position) in &portfolio.positions {
                let expected = child_units.get(asset_id).copied().unwrap_or(Decimal::ZERO);
                debug_assert_eq!(
                    position.units, expected,
                    "portfolio `{}` position in `{}` ({}) diverges from its subtree's sum ({})",
                    portfolio.portfolio_id.as_str(), asset_id.as_str(), position.units, expected
                );
            }
            debug_assert_eq!(
                portfolio.cash, child_cash,
                "portfolio `{}` cash ({}) diverges from its leaves' sum ({})",
                portfolio.portfolio_id.as_str(), portfolio.cash, child_cash
            );
        }
    }

    #[cfg(debug_assertions)]
    fn leaf_cash_sum(&self, portfolio_id: &PortfolioId) -> Decimal {
        let portfolio = &self.portfolios[portfolio_id];
        if portfolio.children.is_empty() {
            return portfolio.cash;
        }
        portfolio.children.iter().map(|child_id| self.leaf_cash_sum(child_id)).sum()
    }

    pub fn record_event(&mut self, portfolio_id: &PortfolioId, event: EventRecord) {
        if let Some(portfolio) = self.portfolios.get_mut(portfolio_id) {
            portfolio.events.push(event);
        }
    }

    /// Converts a [`TargetSize`] to an absolute unit target using `price`,
    /// diffs it against the current position, and returns the delta units
    /// to submit - `None` if the delta is exactly zero (the epsilon=0 Law:
    /// calling this repeatedly at an already-reached target is a no-op).
    pub fn target_size_delta(&self, portfolio_id: &PortfolioId, asset_id: &AssetId, target: TargetSize, price: Decimal) -> Result<Option<Decimal>, ConfigError> {
        let portfolio = self.portfolios.get(portfolio_id).ok_or_else(|| ConfigError::UnknownPortfolio(portfolio_id.as_str().to_string()))?;

        let target_units = match target {
            TargetSize::Units(units) => units,
            TargetSize::Dollars(dollars) => dollars / price,
            TargetSize::Pct(pct) => (pct * portfolio.nlv()) / price,
        };

        let current = portfolio.position_units(asset_id);
        let delta = target_units - current;
        Ok(if delta.is_zero() { None } else { Some(delta) })
    }

    pub fn close_position_delta(&self, portfolio_id: &PortfolioId, asset_id: &AssetId) -> Result<Option<Decimal>, ConfigError> {
        let portfolio = self.portfolios.get(portfolio_id).ok_or_else(|| ConfigError::UnknownPortfolio(portfolio_id.as_str().to_string()))?;
        let current = portfolio.position_units(asset_id);
        Ok(if current.is_zero() { None } else { Some(-current) })
    }

    pub fn portfolio_ids(&self) -> impl Iterator<Item = &PortfolioId> {
        self.portfolios.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_instrument::BrokerId;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn ids() -> hydra_instrument::ids::IdSequence {
        hydra_instrument::ids::IdSequence::new()
    }

    #[test]
    fn propagation_updates_parent_and_master_cash_and_positions() {
        let mut arena = PortfolioArena::new(dec!(10000));
        arena.create_sub_portfolio(PortfolioId::from("p1"), &arena.master_id().clone(), dec!(0)).unwrap();

        let seq = ids();
        arena
            .propagate_fill(
                &PortfolioId::from("p1"),
                &AssetId::from("SPY"),
                dec!(50),
                dec!(101),
                1,
                &StrategyId::from("s1"),
                OrderId(0),
                &BrokerId::from("b1"),
                &seq,
            )
            .unwrap();

        let p1 = arena.get(&PortfolioId::from("p1")).unwrap();
        assert_eq!(p1.position_units(&AssetId::from("SPY")), dec!(50));
        assert_eq!(p1.cash, dec!(0) - dec!(50) * dec!(101));

        let master = arena.get(arena.master_id()).unwrap();
        assert_eq!(master.position_units(&AssetId::from("SPY")), dec!(50));
        assert_eq!(master.cash, p1.cash, "master has one leaf, p1, so its cash is a pure rollup of p1's");
    }

    #[test]
    fn aggregation_sums_opposite_signed_children_at_master() {
        let mut arena = PortfolioArena::new(dec!(0));
        arena.create_sub_portfolio(PortfolioId::from("p1"), &arena.master_id().clone(), dec!(10000)).unwrap();
        arena.create_sub_portfolio(PortfolioId::from("p2"), &arena.master_id().clone(), dec!(10000)).unwrap();

        let seq = ids();
        arena
            .propagate_fill(&PortfolioId::from("p1"), &AssetId::from("SPY"), dec!(50), dec!(101), 1, &StrategyId::from("s1"), OrderId(0), &BrokerId::from("b1"), &seq)
            .unwrap();
        arena
            .propagate_fill(&PortfolioId::from("p2"), &AssetId::from("SPY"), dec!(-100), dec!(101), 1, &StrategyId::from("s1"), OrderId(1), &BrokerId::from("b1"), &seq)
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert(AssetId::from("SPY"), dec!(101.5));
        arena.evaluate(&prices, Some(1));

        let p1 = arena.get(&PortfolioId::from("p1")).unwrap();
        let p2 = arena.get(&PortfolioId::from("p2")).unwrap();
        let master = arena.get(arena.master_id()).unwrap();

        assert_eq!(p1.unrealized_pnl(), dec!(50) * dec!(0.5));
        assert_eq!(p2.unrealized_pnl(), dec!(-100) * dec!(0.5));
        assert_eq!(master.unrealized_pnl(), p1.unrealized_pnl() + p2.unrealized_pnl());
        assert_eq!(master.cash, p1.cash + p2.cash);
        assert_eq!(master.nlv(), p1.nlv() + p2.nlv());
    }

    #[test]
    fn target_size_dollars_converts_with_price_and_skips_at_zero_delta() {
        let arena = PortfolioArena::new(dec!(10000));
        let master_id = arena.master_id().clone();

        let delta = arena
            .target_size_delta(&master_id, &AssetId::from("SPY"), TargetSize::Dollars(dec!(101)), dec!(101))
            .unwrap();
        assert_eq!(delta, Some(dec!(1)));

        let same_target_again = arena
            .target_size_delta(&master_id, &AssetId::from("SPY"), TargetSize::Units(dec!(0)), dec!(101))
            .unwrap();
        assert_eq!(same_target_again, None);
    }

    #[test]
    fn close_position_delta_is_negative_of_current_units() {
        let mut arena = PortfolioArena::new(dec!(10000));
        let master_id = arena.master_id().clone();
        let seq = ids();
        arena
            .propagate_fill(&master_id, &AssetId::from("SPY"), dec!(50), dec!(101), 1, &StrategyId::from("s1"), OrderId(0), &BrokerId::from("b1"), &seq)
            .unwrap();

        let delta = arena.close_position_delta(&master_id, &AssetId::from("SPY")).unwrap();
        assert_eq!(delta, Some(dec!(-50)));
    }
}
