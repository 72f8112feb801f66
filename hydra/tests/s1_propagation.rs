mod support;

use hydra::PortfolioHandle;
use hydra_instrument::{AssetId, ExecutionType, TargetSize};
use hydra_strategy::{InvalidStrategy, OrderSink, Strategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Buys one unit on the very first `on_open` and then does nothing.
struct OnceBuyer {
    asset_id: AssetId,
    handle: Option<PortfolioHandle>,
    placed: bool,
}

impl Strategy<PortfolioHandle> for OnceBuyer {
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
        handle.order_target_size(self.asset_id.clone(), TargetSize::Units(dec!(50)), ExecutionType::Eager);
    }

    fn on_close(&mut self) {}
}

#[test]
fn fill_propagates_from_sub_portfolio_to_master() {
    let rows = vec![(1i64, dec!(100), dec!(101)), (2, dec!(102), dec!(103))];
    let mut builder = support::single_asset_builder("SPY", &rows, dec!(10000));
    let master_id = builder.master_id();
    builder.new_portfolio("desk", master_id, Decimal::ZERO).unwrap();

    builder
        .register_strategy(
            "s1",
            "desk",
            OnceBuyer { asset_id: AssetId::from("SPY"), handle: None, placed: false },
        )
        .unwrap();

    let mut hydra = builder.build().unwrap();
    let master_id = hydra.master_id();
    let desk_id = hydra_instrument::PortfolioId::from("desk");

    hydra.step();

    assert_eq!(hydra.position_units(&desk_id, &AssetId::from("SPY")), dec!(50));
    assert_eq!(hydra.position_units(&master_id, &AssetId::from("SPY")), dec!(50));

    let desk_cash = hydra.cash(&desk_id);
    let master_cash = hydra.cash(&master_id);
    assert_eq!(desk_cash, Decimal::ZERO - dec!(50) * dec!(100));
    assert_eq!(master_cash, desk_cash, "master has one leaf, desk, so its cash is a pure rollup of desk's");
}
