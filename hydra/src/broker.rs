use crate::exchange::Exchange;
use hydra_instrument::ids::IdSequence;
use hydra_instrument::{AssetId, BrokerId, ExchangeId, ExecutionType, OrderId, OrderState, OrderType, PortfolioId, RejectReason, StrategyId};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Which of the two per-step matching points a `match_phase` call is
/// servicing. `Open` uses the open-phase fill price column (the forward
/// pass); `Close` uses the close-phase column (the backward pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Close,
}

/// A resting order. `Eager` orders are eligible at whichever matching
/// point - open-phase or close-phase - comes next after submission, on
/// the same step. `Lazy` orders always wait for the open-phase match of a
/// *later* step, skipping every matching point on their submission step.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub asset_id: AssetId,
    pub units: Decimal,
    pub strategy_id: StrategyId,
    pub portfolio_id: PortfolioId,
    pub exchange_id: ExchangeId,
    pub broker_id: BrokerId,
    pub order_type: OrderType,
    pub execution_type: ExecutionType,
    pub limit_steps: Option<u32>,
    pub state: OrderState,
    submitted_step: u64,
}

/// The outcome of one order reaching a matching attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Filled { order: Order, fill_price: Decimal, fill_time: i64 },
    Rejected { order: Order, reason: RejectReason },
    Cancelled { order: Order },
}

/// Matches pending orders against an [`Exchange`]'s current row.
///
/// A broker holds no reference to the exchanges it trades through; the
/// exchange is passed in at each matching call instead; Hydra is the sole
/// owner of both and threads the right one through.
pub struct Broker {
    broker_id: BrokerId,
    open_price_column: String,
    close_price_column: String,
    pending: VecDeque<Order>,
    ids: IdSequence,
}

impl Broker {
    pub fn new(broker_id: impl Into<BrokerId>, open_price_column: impl Into<String>, close_price_column: impl Into<String>) -> Self {
        Self {
            broker_id: broker_id.into(),
            open_price_column: open_price_column.into(),
            close_price_column: close_price_column.into(),
            pending: VecDeque::new(),
            ids: IdSequence::new(),
        }
    }

    pub fn broker_id(&self) -> &BrokerId {
        &self.broker_id
    }

    pub fn open_price_column(&self) -> &str {
        &self.open_price_column
    }

    pub fn close_price_column(&self) -> &str {
        &self.close_price_column
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every pending order and restarts this broker's own
    /// [`OrderId`] sequence from zero, so replayed runs assign identical
    /// order ids to identical submissions.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.ids = IdSequence::new();
    }

    /// Accepts an order into the pending queue, assigning it a monotonic
    /// [`OrderId`].
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        asset_id: AssetId,
        units: Decimal,
        strategy_id: StrategyId,
        portfolio_id: PortfolioId,
        exchange_id: ExchangeId,
        execution_type: ExecutionType,
        limit_steps: Option<u32>,
        current_step: u64,
    ) -> OrderId {
        let order_id = OrderId(self.ids.next());
        self.pending.push_back(Order {
            order_id,
            asset_id,
            units,
            strategy_id,
            portfolio_id,
            exchange_id,
            broker_id: self.broker_id.clone(),
            order_type: OrderType::Market,
            execution_type,
            limit_steps,
            state: OrderState::Pending,
            submitted_step: current_step,
        });
        order_id
    }

    /// Attempts to match every pending order eligible for `phase`, against
    /// `exchange`'s current row. FIFO within this call - orders are
    /// attempted in submission order. Orders not eligible for `phase`
    /// remain queued untouched.
    ///
    /// Eligibility: `Eager` orders are eligible at any matching point,
    /// including the very one they were submitted before this call on the
    /// same step - this is what lets an order placed in `on_open` fill at
    /// that step's open-phase pass, and one placed in `on_close` fill at
    /// that same step's close-phase pass. `Lazy` orders are eligible only
    /// at an open-phase pass on a step strictly later than the one they
    /// were submitted on, so they never fill within their own submission
    /// step regardless of which phase they were queued during.
    pub fn match_phase(&mut self, exchange: &Exchange, phase: Phase, current_step: u64, fill_time: i64) -> Vec<MatchOutcome> {
        let mut outcomes = Vec::new();
        let mut still_pending = VecDeque::with_capacity(self.pending.len());

        while let Some(order) = self.pending.pop_front() {
            let eligible = match order.execution_type {
                ExecutionType::Eager => true,
                ExecutionType::Lazy => phase == Phase::Open && current_step > order.submitted_step,
            };
            if !eligible {
                still_pending.push_back(order);
                continue;
            }

            if let Some(limit) = order.limit_steps {
                if current_step.saturating_sub(order.submitted_step) >= limit as u64 {
                    let mut cancelled = order;
                    cancelled.state = OrderState::Cancelled;
                    outcomes.push(MatchOutcome::Cancelled { order: cancelled });
                    continue;
                }
            }

            if !exchange.is_active(&order.asset_id) {
                let mut rejected = order;
                rejected.state = OrderState::Rejected;
                outcomes.push(MatchOutcome::Rejected { order: rejected, reason: RejectReason::AssetInactive });
                continue;
            }

            let column = match phase {
                Phase::Open => &self.open_price_column,
                Phase::Close => &self.close_price_column,
            };

            match exchange.get_asset_feature(&order.asset_id, column, 0) {
                Ok(price) if price > Decimal::ZERO => {
                    let mut filled = order;
                    filled.state = OrderState::Filled;
                    outcomes.push(MatchOutcome::Filled { order: filled, fill_price: price, fill_time });
                }
                Ok(_) => {
                    let mut rejected = order;
                    rejected.state = OrderState::Rejected;
                    outcomes.push(MatchOutcome::Rejected { order: rejected, reason: RejectReason::PriceUnavailable });
                }
                Err(_) => {
                    let mut rejected = order;
                    rejected.state = OrderState::Rejected;
                    outcomes.push(MatchOutcome::Rejected { order: rejected, reason: RejectReason::InsufficientExchange });
                }
            }
        }

        self.pending = still_pending;
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use rust_decimal_macros::dec;

    fn exchange_with_one_asset() -> Exchange {
        let asset = Asset::from_columns(
            "SPY",
            vec!["OPEN".into(), "CLOSE".into()],
            vec![vec![dec!(100), dec!(101)], vec![dec!(102), dec!(103)]],
            vec![1, 2],
            0,
        )
        .unwrap();
        let mut exchange = Exchange::new("NYSE");
        exchange.add_asset(asset);
        exchange.build();
        exchange.step();
        exchange
    }

    #[test]
    fn eager_order_fills_at_open_phase_with_open_price() {
        let exchange = exchange_with_one_asset();
        let mut broker = Broker::new("b1", "OPEN", "CLOSE");
        broker.submit(
            AssetId::from("SPY"),
            dec!(10),
            StrategyId::from("s1"),
            PortfolioId::from("master"),
            ExchangeId::from("NYSE"),
            ExecutionType::Eager,
            None,
            0,
        );

        let outcomes = broker.match_phase(&exchange, Phase::Open, 0, 1);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            MatchOutcome::Filled { fill_price, .. } => assert_eq!(*fill_price, dec!(100)),
            other => panic!("expected fill, got {other:?}"),
        }
        assert_eq!(broker.pending_len(), 0);
    }

    #[test]
    fn lazy_order_never_fills_within_its_own_submission_step() {
        let exchange = exchange_with_one_asset();
        let mut broker = Broker::new("b1", "OPEN", "CLOSE");
        broker.submit(
            AssetId::from("SPY"),
            dec!(10),
            StrategyId::from("s1"),
            PortfolioId::from("master"),
            ExchangeId::from("NYSE"),
            ExecutionType::Lazy,
            None,
            0,
        );

        let open_outcomes = broker.match_phase(&exchange, Phase::Open, 0, 1);
        assert!(open_outcomes.is_empty());
        assert_eq!(broker.pending_len(), 1);

        let close_outcomes = broker.match_phase(&exchange, Phase::Close, 0, 1);
        assert!(close_outcomes.is_empty());
        assert_eq!(broker.pending_len(), 1);

        let next_step_open_outcomes = broker.match_phase(&exchange, Phase::Open, 1, 2);
        assert_eq!(next_step_open_outcomes.len(), 1);
        match &next_step_open_outcomes[0] {
            MatchOutcome::Filled { fill_price, .. } => assert_eq!(*fill_price, dec!(100)),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn eager_order_submitted_at_close_fills_same_step_at_close_price() {
        let exchange = exchange_with_one_asset();
        let mut broker = Broker::new("b1", "OPEN", "CLOSE");
        broker.submit(
            AssetId::from("SPY"),
            dec!(10),
            StrategyId::from("s1"),
            PortfolioId::from("master"),
            ExchangeId::from("NYSE"),
            ExecutionType::Eager,
            None,
            0,
        );

        let close_outcomes = broker.match_phase(&exchange, Phase::Close, 0, 1);
        assert_eq!(close_outcomes.len(), 1);
        match &close_outcomes[0] {
            MatchOutcome::Filled { fill_price, .. } => assert_eq!(*fill_price, dec!(101)),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn order_on_inactive_asset_is_rejected() {
        let exchange = Exchange::new("NYSE");
        let mut broker = Broker::new("b1", "OPEN", "CLOSE");
        broker.submit(
            AssetId::from("GHOST"),
            dec!(10),
            StrategyId::from("s1"),
            PortfolioId::from("master"),
            ExchangeId::from("NYSE"),
            ExecutionType::Eager,
            None,
            0,
        );

        let outcomes = broker.match_phase(&exchange, Phase::Open, 0, 1);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            MatchOutcome::Rejected { reason: RejectReason::AssetInactive, .. }
        ));
    }

    #[test]
    fn order_expires_past_limit_steps() {
        let exchange = exchange_with_one_asset();
        let mut broker = Broker::new("b1", "OPEN", "CLOSE");
        broker.submit(
            AssetId::from("SPY"),
            dec!(10),
            StrategyId::from("s1"),
            PortfolioId::from("master"),
            ExchangeId::from("NYSE"),
            ExecutionType::Eager,
            Some(2),
            0,
        );

        let outcomes = broker.match_phase(&exchange, Phase::Open, 3, 1);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], MatchOutcome::Cancelled { .. }));
    }
}
