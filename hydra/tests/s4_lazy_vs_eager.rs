mod support;

use hydra::PortfolioHandle;
use hydra_instrument::{AssetId, ExecutionType, TargetSize};
use hydra_strategy::{InvalidStrategy, OrderSink, Strategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Places one order on the very first `on_open`, with a configurable
/// execution policy, and otherwise does nothing. Used to compare eager vs
/// lazy fill timing under an identical market.
struct OnceAtOpen {
    asset_id: AssetId,
    execution: ExecutionType,
    handle: Option<PortfolioHandle>,
    placed: bool,
}

impl Strategy<PortfolioHandle> for OnceAtOpen {
    fn build(&mut self, handle: PortfolioHandle) -> Result<(), InvalidStrategy> {
        self.handle = Some(handle);
        Ok(())
    }

    fn on_open(&mut self) {
        if self.placed {
            return;
        }
        self.placed = true;
        let handle = self.handle.as_mut().expect("build ran before on_open");
        handle.order_target_size(self.asset_id.clone(), TargetSize::Units(dec!(10)), self.execution);
    }

    fn on_close(&mut self) {}
}

#[test]
fn eager_order_is_filled_before_on_close_runs_the_same_step() {
    let rows = vec![(1i64, dec!(100), dec!(101)), (2, dec!(102), dec!(103))];
    let mut builder = support::single_asset_builder("SPY", &rows, dec!(10000));
    builder
        .register_strategy(
            "s1",
            builder.master_id(),
            OnceAtOpen { asset_id: AssetId::from("SPY"), execution: ExecutionType::Eager, handle: None, placed: false },
        )
        .unwrap();

    let mut hydra = builder.build().unwrap();
    let master_id = hydra.master_id();

    hydra.step();

    assert_eq!(hydra.position_units(&master_id, &AssetId::from("SPY")), dec!(10));
    let cash = hydra.cash(&master_id);
    assert_eq!(cash, dec!(10000) - dec!(10) * dec!(100));
}

#[test]
fn lazy_order_remains_unfilled_through_the_whole_submission_step_and_fills_next_open() {
    let rows = vec![(1i64, dec!(100), dec!(101)), (2, dec!(102), dec!(103)), (3, dec!(104), dec!(105))];
    let mut builder = support::single_asset_builder("SPY", &rows, dec!(10000));
    builder
        .register_strategy(
            "s1",
            builder.master_id(),
            OnceAtOpen { asset_id: AssetId::from("SPY"), execution: ExecutionType::Lazy, handle: None, placed: false },
        )
        .unwrap();

    let mut hydra = builder.build().unwrap();
    let master_id = hydra.master_id();

    hydra.step();
    assert_eq!(
        hydra.position_units(&master_id, &AssetId::from("SPY")),
        Decimal::ZERO,
        "a lazy order submitted in on_open must not fill within the same step, even at the close-phase match"
    );

    hydra.step();
    assert_eq!(
        hydra.position_units(&master_id, &AssetId::from("SPY")),
        dec!(10),
        "a lazy order fills at the next step's open-phase match"
    );
    let cash = hydra.cash(&master_id);
    assert_eq!(cash, dec!(10000) - dec!(10) * dec!(102), "lazy fill prices against the open of the step it actually fills in");
}
