use crate::asset::Asset;
use crate::broker::{Broker, MatchOutcome, Phase};
use crate::error::{ConfigError, HydraError};
use crate::exchange::Exchange;
use crate::portfolio::{EventRecord, PortfolioArena};
use hydra_instrument::ids::IdSequence;
use hydra_instrument::{AssetId, BrokerId, ExchangeId, ExecutionType, PortfolioId, RejectReason, StrategyId, TargetSize};
use hydra_strategy::{InvalidStrategy, OrderSink, Strategy, StrategyContext};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, warn};

/// Which exchange and broker an asset trades through - fixed at
/// registration time, resolved on every order a strategy places.
#[derive(Debug, Clone)]
struct Route {
    exchange_id: ExchangeId,
    broker_id: BrokerId,
}

struct StrategyEntry {
    strategy_id: StrategyId,
    strategy: Box<dyn Strategy<PortfolioHandle>>,
}

/// All of Hydra's live, mutable state. Held behind a single `Rc<RefCell<_>>`
/// so that [`PortfolioHandle`]s handed to strategies at registration can
/// read prices and submit orders without threading an explicit reference
/// through every callback - there is exactly one owner, the `Hydra` kernel
/// driving the step loop, and no concurrency to guard against.
struct HydraInner {
    exchanges: HashMap<ExchangeId, Exchange>,
    brokers: HashMap<BrokerId, Broker>,
    portfolios: PortfolioArena,
    routes: HashMap<AssetId, Route>,
    strategies: Vec<StrategyEntry>,
    trade_ids: IdSequence,
    step_count: u64,
}

impl HydraInner {
    fn route(&self, asset_id: &AssetId) -> Result<&Route, ConfigError> {
        self.routes.get(asset_id).ok_or_else(|| ConfigError::UnknownAsset(asset_id.as_str().to_string()))
    }

    /// The "decision price" a strategy observes when sizing an order:
    /// the routed broker's open-phase column on the current row.
    fn observed_price(&self, asset_id: &AssetId) -> Result<Decimal, HydraError> {
        let route = self.route(asset_id)?;
        let exchange = &self.exchanges[&route.exchange_id];
        let broker = &self.brokers[&route.broker_id];
        Ok(exchange.get_asset_feature(asset_id, broker.open_price_column(), 0)?)
    }

    fn submit_order(&mut self, portfolio_id: &PortfolioId, strategy_id: &StrategyId, asset_id: AssetId, units: Decimal, execution_type: ExecutionType) {
        if units.is_zero() {
            return;
        }
        let route = match self.route(&asset_id) {
            Ok(route) => route.clone(),
            Err(_) => {
                warn!(asset = asset_id.as_str(), "order placed against unrouted asset, ignored");
                return;
            }
        };
        let order_id = self.brokers.get_mut(&route.broker_id).expect("route targets a registered broker").submit(
            asset_id.clone(),
            units,
            strategy_id.clone(),
            portfolio_id.clone(),
            route.exchange_id.clone(),
            execution_type,
            None,
            self.step_count,
        );
        self.portfolios.record_event(
            portfolio_id,
            EventRecord::Submitted { order_id, asset_id, units, strategy_id: strategy_id.clone() },
        );
    }

    /// Drains every broker's queue for `phase`, propagating fills and
    /// rejections into the portfolio tree and the `EVENT` tracer.
    fn match_phase(&mut self, phase: Phase, fill_time: i64) {
        let broker_ids: Vec<BrokerId> = self.brokers.keys().cloned().collect();
        for broker_id in broker_ids {
            let exchange_id = {
                let Some((asset_id, _)) = self.routes.iter().find(|(_, r)| r.broker_id == broker_id) else { continue };
                self.routes[asset_id].exchange_id.clone()
            };
            let outcomes = {
                let exchange = &self.exchanges[&exchange_id];
                let broker = self.brokers.get_mut(&broker_id).expect("broker_id came from self.brokers");
                broker.match_phase(exchange, phase, self.step_count, fill_time)
            };

            for outcome in outcomes {
                match outcome {
                    MatchOutcome::Filled { order, fill_price, fill_time } => {
                        debug!(asset = order.asset_id.as_str(), units = %order.units, price = %fill_price, "order filled");
                        let trade_ids = self
                            .portfolios
                            .propagate_fill(&order.portfolio_id, &order.asset_id, order.units, fill_price, fill_time, &order.strategy_id, order.order_id, &order.broker_id, &self.trade_ids)
                            .unwrap_or_default();
                        if let Some(trade_id) = trade_ids.first() {
                            self.portfolios.record_event(
                                &order.portfolio_id,
                                EventRecord::Filled { order_id: order.order_id, trade_id: *trade_id, asset_id: order.asset_id, units: order.units, fill_price },
                            );
                        }
                    }
                    MatchOutcome::Rejected { order, reason } => {
                        warn!(asset = order.asset_id.as_str(), ?reason, "order rejected");
                        self.portfolios.record_event(
                            &order.portfolio_id,
                            EventRecord::Rejected { order_id: order.order_id, asset_id: order.asset_id, reason: reason_text(reason) },
                        );
                    }
                    MatchOutcome::Cancelled { order } => {
                        debug!(asset = order.asset_id.as_str(), "order cancelled past limit_steps");
                        self.portfolios.record_event(&order.portfolio_id, EventRecord::Cancelled { order_id: order.order_id, asset_id: order.asset_id });
                    }
                }
            }
        }
    }

    /// Marks every position at the current row of its routed exchange and
    /// asset, using `column`, and appends one `VALUE` snapshot per
    /// portfolio.
    fn evaluate(&mut self, column: &str, timestamp: Option<i64>) {
        let mut prices = HashMap::new();
        for (asset_id, route) in &self.routes {
            if let Ok(price) = self.exchanges[&route.exchange_id].get_asset_feature(asset_id, column, 0) {
                prices.insert(asset_id.clone(), price);
            }
        }
        self.portfolios.evaluate(&prices, timestamp);
    }
}

fn reason_text(reason: RejectReason) -> String {
    reason.to_string()
}

/// A handle a strategy stores on its own fields after [`Strategy::build`],
/// giving it the portfolio read access and order-submission capability
/// `on_open`/`on_close` need without taking any arguments.
#[derive(Clone)]
pub struct PortfolioHandle {
    inner: Rc<RefCell<HydraInner>>,
    portfolio_id: PortfolioId,
    strategy_id: StrategyId,
}

impl OrderSink for PortfolioHandle {
    fn place_market_order(&mut self, asset_id: AssetId, units: Decimal, execution: ExecutionType) {
        self.inner.borrow_mut().submit_order(&self.portfolio_id, &self.strategy_id, asset_id, units, execution);
    }

    fn order_target_size(&mut self, asset_id: AssetId, target: TargetSize, execution: ExecutionType) {
        let mut inner = self.inner.borrow_mut();
        let Ok(price) = inner.observed_price(&asset_id) else {
            warn!(asset = asset_id.as_str(), "target-size order has no observable price, ignored");
            return;
        };
        match inner.portfolios.target_size_delta(&self.portfolio_id, &asset_id, target, price) {
            Ok(Some(delta)) => inner.submit_order(&self.portfolio_id, &self.strategy_id, asset_id, delta, execution),
            Ok(None) => {}
            Err(err) => warn!(%err, "target-size order rejected"),
        }
    }

    fn order_target_allocations(&mut self, allocations: BTreeMap<AssetId, Decimal>, execution: ExecutionType) {
        let mut inner = self.inner.borrow_mut();

        let mut asset_ids: Vec<AssetId> = allocations.keys().cloned().collect();
        if let Some(portfolio) = inner.portfolios.get(&self.portfolio_id) {
            for held in portfolio.positions.keys() {
                if !allocations.contains_key(held) {
                    asset_ids.push(held.clone());
                }
            }
        }
        asset_ids.sort();
        asset_ids.dedup();

        for asset_id in asset_ids {
            let target_pct = allocations.get(&asset_id).copied().unwrap_or(Decimal::ZERO);
            let Ok(price) = inner.observed_price(&asset_id) else {
                warn!(asset = asset_id.as_str(), "target-allocation order has no observable price, ignored");
                continue;
            };
            match inner.portfolios.target_size_delta(&self.portfolio_id, &asset_id, TargetSize::Pct(target_pct), price) {
                Ok(Some(delta)) => inner.submit_order(&self.portfolio_id, &self.strategy_id, asset_id, delta, execution),
                Ok(None) => {}
                Err(err) => warn!(%err, "target-allocation order rejected"),
            }
        }
    }

    fn close_position(&mut self, asset_id: AssetId, execution: ExecutionType) {
        let mut inner = self.inner.borrow_mut();
        match inner.portfolios.close_position_delta(&self.portfolio_id, &asset_id) {
            Ok(Some(delta)) => inner.submit_order(&self.portfolio_id, &self.strategy_id, asset_id, delta, execution),
            Ok(None) => {}
            Err(err) => warn!(%err, "close_position failed"),
        }
    }
}

impl StrategyContext for PortfolioHandle {
    fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    fn position_units(&self, asset_id: &AssetId) -> Decimal {
        self.inner.borrow().portfolios.get(&self.portfolio_id).map(|p| p.position_units(asset_id)).unwrap_or(Decimal::ZERO)
    }

    fn cash(&self) -> Decimal {
        self.inner.borrow().portfolios.get(&self.portfolio_id).map(|p| p.cash).unwrap_or(Decimal::ZERO)
    }

    fn nlv(&self) -> Decimal {
        self.inner.borrow().portfolios.get(&self.portfolio_id).map(|p| p.nlv()).unwrap_or(Decimal::ZERO)
    }
}

/// Registration-phase builder. Every `register_*`/`new_*` call is valid
/// only before [`HydraBuilder::build`] consumes it.
pub struct HydraBuilder {
    exchanges: HashMap<ExchangeId, Exchange>,
    brokers: HashMap<BrokerId, Broker>,
    portfolios: PortfolioArena,
    routes: HashMap<AssetId, Route>,
    #[allow(clippy::type_complexity)]
    pending_strategies: Vec<(StrategyId, PortfolioId, Box<dyn FnOnce(PortfolioHandle) -> Result<Box<dyn Strategy<PortfolioHandle>>, InvalidStrategy>>)>,
}

impl HydraBuilder {
    pub fn new(cash: Decimal) -> Self {
        Self {
            exchanges: HashMap::new(),
            brokers: HashMap::new(),
            portfolios: PortfolioArena::new(cash),
            routes: HashMap::new(),
            pending_strategies: Vec::new(),
        }
    }

    pub fn new_exchange(&mut self, exchange_id: impl Into<ExchangeId>) -> &mut Self {
        let exchange_id = exchange_id.into();
        self.exchanges.entry(exchange_id.clone()).or_insert_with(|| Exchange::new(exchange_id));
        self
    }

    pub fn new_broker(&mut self, broker_id: impl Into<BrokerId>, open_price_column: impl Into<String>, close_price_column: impl Into<String>) -> &mut Self {
        let broker_id = broker_id.into();
        self.brokers.entry(broker_id.clone()).or_insert_with(|| Broker::new(broker_id, open_price_column, close_price_column));
        self
    }

    pub fn new_portfolio(&mut self, portfolio_id: impl Into<PortfolioId>, parent_id: impl Into<PortfolioId>, cash: Decimal) -> Result<&mut Self, ConfigError> {
        self.portfolios.create_sub_portfolio(portfolio_id.into(), &parent_id.into(), cash)?;
        Ok(self)
    }

    pub fn master_id(&self) -> PortfolioId {
        self.portfolios.master_id().clone()
    }

    /// Registers `asset` with `exchange_id`, routing every order placed
    /// against it through `broker_id`.
    pub fn register_asset(&mut self, asset: Asset, exchange_id: &ExchangeId, broker_id: &BrokerId) -> Result<&mut Self, ConfigError> {
        if !self.brokers.contains_key(broker_id) {
            return Err(ConfigError::UnknownBroker(broker_id.as_str().to_string()));
        }
        let exchange = self.exchanges.get_mut(exchange_id).ok_or_else(|| ConfigError::UnknownExchange(exchange_id.as_str().to_string()))?;

        let asset_id = asset.asset_id().clone();
        if self.routes.contains_key(&asset_id) {
            return Err(ConfigError::DuplicateId(asset_id.as_str().to_string()));
        }
        exchange.add_asset(asset);
        self.routes.insert(asset_id, Route { exchange_id: exchange_id.clone(), broker_id: broker_id.clone() });
        Ok(self)
    }

    pub fn set_index_asset(&mut self, exchange_id: &ExchangeId, asset_id: AssetId) -> Result<&mut Self, ConfigError> {
        let exchange = self.exchanges.get_mut(exchange_id).ok_or_else(|| ConfigError::UnknownExchange(exchange_id.as_str().to_string()))?;
        exchange.set_index_asset(asset_id);
        Ok(self)
    }

    /// Attaches a rolling beta tracker on `asset_id`, computed against
    /// `exchange_id`'s index asset (see [`Self::set_index_asset`]).
    pub fn with_asset_beta_tracker(&mut self, exchange_id: &ExchangeId, asset_id: &AssetId, column: &str, window: usize) -> Result<&mut Self, HydraError> {
        let exchange = self
            .exchanges
            .remove(exchange_id)
            .ok_or_else(|| ConfigError::UnknownExchange(exchange_id.as_str().to_string()))?;
        self.exchanges.insert(exchange_id.clone(), exchange.with_beta_tracker(asset_id, column, window)?);
        Ok(self)
    }

    /// Registers a strategy under `strategy_id`. `portfolio_id` is the
    /// portfolio its [`PortfolioHandle`] will read and trade through.
    /// `strategy.build` runs once, at [`HydraBuilder::build`], validating
    /// the strategy's capability set against what was actually registered.
    pub fn register_strategy<S>(&mut self, strategy_id: impl Into<StrategyId>, portfolio_id: impl Into<PortfolioId>, mut strategy: S) -> Result<&mut Self, ConfigError>
    where
        S: Strategy<PortfolioHandle> + 'static,
    {
        let strategy_id = strategy_id.into();
        if self.pending_strategies.iter().any(|(id, _, _)| id == &strategy_id) {
            return Err(ConfigError::DuplicateId(strategy_id.as_str().to_string()));
        }
        let portfolio_id = portfolio_id.into();
        if self.portfolios.get(&portfolio_id).is_none() {
            return Err(ConfigError::UnknownPortfolio(portfolio_id.as_str().to_string()));
        }

        self.pending_strategies.push((
            strategy_id,
            portfolio_id,
            Box::new(move |handle: PortfolioHandle| {
                strategy.build(handle)?;
                Ok(Box::new(strategy) as Box<dyn Strategy<PortfolioHandle>>)
            }),
        ));
        Ok(self)
    }

    /// Consumes the builder: merges every exchange's clock, validates
    /// every pending strategy's capability set, and returns a runnable
    /// [`Hydra`].
    pub fn build(mut self) -> Result<Hydra, HydraError> {
        for exchange in self.exchanges.values_mut() {
            exchange.build();
        }

        self.portfolios.rollup_cash();
        self.portfolios.seed_value_history();

        let inner = Rc::new(RefCell::new(HydraInner {
            exchanges: self.exchanges,
            brokers: self.brokers,
            portfolios: self.portfolios,
            routes: self.routes,
            strategies: Vec::new(),
            trade_ids: IdSequence::new(),
            step_count: 0,
        }));

        let mut strategies = Vec::with_capacity(self.pending_strategies.len());
        for (strategy_id, portfolio_id, build_fn) in self.pending_strategies {
            let handle = PortfolioHandle { inner: Rc::clone(&inner), portfolio_id, strategy_id: strategy_id.clone() };
            let strategy = build_fn(handle).map_err(ConfigError::InvalidStrategy)?;
            strategies.push(StrategyEntry { strategy_id, strategy });
        }
        inner.borrow_mut().strategies = strategies;

        Ok(Hydra { inner })
    }
}

/// A built, runnable backtest. Drives the global-clock step loop and owns
/// every exchange, broker, portfolio, and registered strategy.
pub struct Hydra {
    inner: Rc<RefCell<HydraInner>>,
}

impl Hydra {
    /// Advances the simulation by one step: steps every exchange's clock,
    /// dispatches `on_open` to every strategy, matches eager orders against
    /// the open-phase price, marks the portfolio tree, dispatches
    /// `on_close`, matches lazy orders against the close-phase price, and
    /// marks the portfolio tree again. Returns `false` once every exchange
    /// is exhausted.
    pub fn step(&mut self) -> bool {
        let any_stepped = {
            let mut inner = self.inner.borrow_mut();
            let mut stepped = false;
            for exchange in inner.exchanges.values_mut() {
                stepped |= exchange.step();
            }
            stepped
        };
        if !any_stepped {
            return false;
        }

        let timestamp = self.current_timestamp();
        let fill_time = timestamp.unwrap_or_default();

        self.dispatch_open();
        self.inner.borrow_mut().match_phase(Phase::Open, fill_time);
        self.evaluate_open(timestamp);

        self.dispatch_close();
        self.inner.borrow_mut().match_phase(Phase::Close, fill_time);
        self.evaluate_close(timestamp);

        self.inner.borrow_mut().step_count += 1;
        debug!(step = self.inner.borrow().step_count, ?timestamp, "step complete");
        true
    }

    fn dispatch_open(&mut self) {
        let mut inner = self.inner.borrow_mut();
        let mut strategies = std::mem::take(&mut inner.strategies);
        drop(inner);
        for entry in strategies.iter_mut() {
            entry.strategy.on_open();
        }
        self.inner.borrow_mut().strategies = strategies;
    }

    fn dispatch_close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        let mut strategies = std::mem::take(&mut inner.strategies);
        drop(inner);
        for entry in strategies.iter_mut() {
            entry.strategy.on_close();
        }
        self.inner.borrow_mut().strategies = strategies;
    }

    fn evaluate_open(&mut self, timestamp: Option<i64>) {
        let mut inner = self.inner.borrow_mut();
        let column = inner.brokers.values().next().map(|b| b.open_price_column().to_string());
        if let Some(column) = column {
            inner.evaluate(&column, timestamp);
        }
    }

    fn evaluate_close(&mut self, timestamp: Option<i64>) {
        let mut inner = self.inner.borrow_mut();
        let column = inner.brokers.values().next().map(|b| b.close_price_column().to_string());
        if let Some(column) = column {
            inner.evaluate(&column, timestamp);
        }
    }

    /// Runs until `step` returns `false`, i.e. every exchange is exhausted.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Runs `steps` steps, or until the simulation is exhausted.
    pub fn run_steps(&mut self, steps: u64) {
        for _ in 0..steps {
            if !self.step() {
                break;
            }
        }
    }

    /// Runs until the current timestamp reaches or passes `to`, or the
    /// simulation is exhausted. Unlike [`Self::run_to`], the step landing
    /// exactly on `to` is never taken - replay is path-dependent, so this
    /// is implemented by actually stepping through every intermediate
    /// timestamp rather than skipping ahead.
    pub fn goto_datetime(&mut self, to: i64) {
        loop {
            match self.peek_next_timestamp() {
                Some(ts) if ts >= to => break,
                Some(_) => {
                    if !self.step() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    /// Runs every step whose timestamp is at or before `to`, stopping
    /// before processing the first step whose timestamp would exceed it.
    /// Unlike [`Self::goto_datetime`], a step landing exactly on `to` is
    /// taken.
    pub fn run_to(&mut self, to: i64) {
        while let Some(ts) = self.peek_next_timestamp() {
            if ts > to {
                break;
            }
            if !self.step() {
                break;
            }
        }
    }

    fn peek_next_timestamp(&self) -> Option<i64> {
        self.inner.borrow().exchanges.values().filter_map(|e| e.peek_next_timestamp()).min()
    }

    pub fn current_timestamp(&self) -> Option<i64> {
        self.inner.borrow().exchanges.values().filter_map(|e| e.current_timestamp()).min()
    }

    /// Returns every exchange's clock, every broker's pending queue, every
    /// portfolio's cash/positions, and every tracer to the post-`build`
    /// initial state. Registered strategies persist (and keep whatever
    /// internal state they've accumulated) unless `clear_strategies` is
    /// set, in which case they are dropped entirely and must be
    /// re-registered before the next `build` - there is no supported path
    /// to re-register strategies onto an already-built `Hydra`.
    pub fn reset(&mut self, clear_history: bool, clear_strategies: bool) {
        let mut inner = self.inner.borrow_mut();
        for exchange in inner.exchanges.values_mut() {
            exchange.reset();
        }
        for broker in inner.brokers.values_mut() {
            broker.reset();
        }
        inner.portfolios.reset(clear_history);
        inner.trade_ids = IdSequence::new();
        inner.step_count = 0;
        if clear_strategies {
            inner.strategies.clear();
        }
    }

    /// `reset(true, false)` followed by `run()` to exhaustion - strategies
    /// persist, history and every cursor start over. Produces byte-for-byte
    /// identical `VALUE`/`EVENT` histories to the original run, provided
    /// every strategy's behaviour is a pure function of the state it reads
    /// back through its [`PortfolioHandle`] (no hidden clock, RNG, or I/O).
    pub fn replay(&mut self) {
        self.reset(true, false);
        self.run();
    }

    pub fn step_count(&self) -> u64 {
        self.inner.borrow().step_count
    }

    pub fn master_id(&self) -> PortfolioId {
        self.inner.borrow().portfolios.master_id().clone()
    }

    pub fn cash(&self, portfolio_id: &PortfolioId) -> Decimal {
        self.inner.borrow().portfolios.get(portfolio_id).map(|p| p.cash).unwrap_or(Decimal::ZERO)
    }

    pub fn nlv(&self, portfolio_id: &PortfolioId) -> Decimal {
        self.inner.borrow().portfolios.get(portfolio_id).map(|p| p.nlv()).unwrap_or(Decimal::ZERO)
    }

    pub fn position_units(&self, portfolio_id: &PortfolioId, asset_id: &AssetId) -> Decimal {
        self.inner.borrow().portfolios.get(portfolio_id).map(|p| p.position_units(asset_id)).unwrap_or(Decimal::ZERO)
    }

    pub fn value_history(&self, portfolio_id: &PortfolioId) -> Vec<crate::portfolio::ValueSnapshot> {
        self.inner.borrow().portfolios.get(portfolio_id).map(|p| p.value_history.clone()).unwrap_or_default()
    }

    pub fn event_history(&self, portfolio_id: &PortfolioId) -> Vec<EventRecord> {
        self.inner.borrow().portfolios.get(portfolio_id).map(|p| p.events.clone()).unwrap_or_default()
    }

    /// Rolling population variance of `asset_id`'s simple returns, if it
    /// carries a volatility tracer and the tracer's window has filled.
    pub fn exchange_asset_volatility(&self, exchange_id: &ExchangeId, asset_id: &AssetId) -> Result<Decimal, hydra_tracer::TracerError> {
        let inner = self.inner.borrow();
        match inner.exchanges.get(exchange_id).and_then(|e| e.asset(asset_id)) {
            Some(asset) => asset.volatility(),
            None => Err(hydra_tracer::TracerError { have: 0, need: 1 }),
        }
    }

    /// Rolling beta of `asset_id`'s simple returns against its exchange's
    /// index asset, if a beta tracer is attached and its window has
    /// filled.
    pub fn exchange_asset_beta(&self, exchange_id: &ExchangeId, asset_id: &AssetId) -> Result<Decimal, hydra_tracer::TracerError> {
        let inner = self.inner.borrow();
        match inner.exchanges.get(exchange_id) {
            Some(exchange) => exchange.beta(asset_id),
            None => Err(hydra_tracer::TracerError { have: 0, need: 1 }),
        }
    }
}
