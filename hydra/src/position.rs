use hydra_instrument::{AssetId, BrokerId, OrderId, PortfolioId, StrategyId, TradeId};
use rust_decimal::Decimal;

/// A single fill against a position. Append-only - trades are never
/// mutated or removed once recorded, only appended as a position's
/// lifecycle progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub trade_id: TradeId,
    pub asset_id: AssetId,
    pub units: Decimal,
    pub fill_price: Decimal,
    pub fill_time: i64,
    pub strategy_id: StrategyId,
    pub order_id: OrderId,
    pub broker_id: BrokerId,
    /// The trade this one continues from, if this fill was the "reopen"
    /// half of a flip (close + reopen in a single fill).
    pub parent_trade_id: Option<TradeId>,
}

/// An open or closed holding of one asset within one portfolio.
///
/// `units` is signed: positive is long, negative is short. A position
/// transitions through `open -> add (same direction) -> reduce (opposite,
/// partial) -> close (opposite, exact)`, or `flip` when an opposite-signed
/// fill exceeds the current magnitude, closing the position and reopening
/// it in the other direction within the same fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub asset_id: AssetId,
    pub units: Decimal,
    pub average_price: Decimal,
    pub last_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub is_open: bool,
    pub trades: Vec<Trade>,
}

impl Position {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            units: Decimal::ZERO,
            average_price: Decimal::ZERO,
            last_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            is_open: false,
            trades: Vec::new(),
        }
    }

    /// Apply a fill of `units` (signed) at `fill_price` to this position,
    /// recording `trade` (with units matching the portion of the fill that
    /// lands on *this* position - see the flip case, which splits one
    /// incoming fill into a closing trade and a reopening trade).
    ///
    /// Returns the cash delta the owning portfolio must apply: negative of
    /// `units * fill_price`, i.e. buying costs cash, selling raises it,
    /// regardless of the position's resulting direction.
    pub fn apply_fill(&mut self, units: Decimal, fill_price: Decimal, trade: Trade) -> Decimal {
        let cash_delta = -(units * fill_price);

        if self.units.is_zero() {
            self.open(units, fill_price, trade);
        } else if same_sign(self.units, units) {
            self.increase(units, fill_price, trade);
        } else if self.units.abs() > units.abs() {
            self.reduce(units, fill_price, trade);
        } else if self.units.abs() == units.abs() {
            self.close(fill_price, trade);
        } else {
            self.flip(units, fill_price, trade);
        }

        cash_delta
    }

    fn open(&mut self, units: Decimal, fill_price: Decimal, trade: Trade) {
        self.units = units;
        self.average_price = fill_price;
        self.last_price = fill_price;
        self.is_open = true;
        self.trades.push(trade);
    }

    fn increase(&mut self, units: Decimal, fill_price: Decimal, trade: Trade) {
        let new_units = self.units + units;
        self.average_price = (self.average_price * self.units.abs() + fill_price * units.abs()) / new_units.abs();
        self.units = new_units;
        self.last_price = fill_price;
        self.trades.push(trade);
    }

    /// Opposite-direction fill smaller in magnitude than the current
    /// position: realizes P&L on the closed portion, average price is
    /// unchanged on the remainder.
    fn reduce(&mut self, units: Decimal, fill_price: Decimal, trade: Trade) {
        let closed_units = units.abs();
        self.realized_pnl += realized_pnl_for_close(self.units, self.average_price, fill_price, closed_units);
        self.units += units;
        self.last_price = fill_price;
        self.trades.push(trade);
    }

    /// Opposite-direction fill exactly closing the position.
    fn close(&mut self, fill_price: Decimal, trade: Trade) {
        let closed_units = self.units.abs();
        self.realized_pnl += realized_pnl_for_close(self.units, self.average_price, fill_price, closed_units);
        self.units = Decimal::ZERO;
        self.unrealized_pnl = Decimal::ZERO;
        self.last_price = fill_price;
        self.is_open = false;
        self.trades.push(trade);
    }

    /// Opposite-direction fill larger in magnitude than the current
    /// position: realizes P&L on the entire prior position, then opens a
    /// new position in the other direction sized at the excess. `trade`
    /// carries the units for the full incoming fill; the caller is
    /// expected to have already reconciled cash against the full fill
    /// size before calling `apply_fill`.
    fn flip(&mut self, units: Decimal, fill_price: Decimal, trade: Trade) {
        let closed_units = self.units.abs();
        self.realized_pnl += realized_pnl_for_close(self.units, self.average_price, fill_price, closed_units);

        let remaining_units = units + self.units;
        self.units = remaining_units;
        self.average_price = fill_price;
        self.last_price = fill_price;
        self.unrealized_pnl = Decimal::ZERO;
        self.is_open = true;
        self.trades.push(trade);
    }

    /// Marks the position to `price`, refreshing `last_price` and
    /// `unrealized_pnl`.
    pub fn evaluate(&mut self, price: Decimal) {
        self.last_price = price;
        self.unrealized_pnl = if self.units.is_zero() {
            Decimal::ZERO
        } else {
            self.units * (price - self.average_price)
        };
    }

    pub fn nlv(&self) -> Decimal {
        self.units * self.last_price
    }
}

fn same_sign(a: Decimal, b: Decimal) -> bool {
    (a > Decimal::ZERO && b > Decimal::ZERO) || (a < Decimal::ZERO && b < Decimal::ZERO)
}

/// Realized P&L for closing `closed_units` (unsigned) out of a position of
/// signed `position_units` held at `average_price`, filled at `fill_price`.
///
/// For a long position (`position_units > 0`) profit is
/// `(fill_price - average_price) * closed_units`; for a short position it
/// is the negative of that, since a short profits when price falls.
fn realized_pnl_for_close(position_units: Decimal, average_price: Decimal, fill_price: Decimal, closed_units: Decimal) -> Decimal {
    let direction = if position_units > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };
    direction * (fill_price - average_price) * closed_units
}
