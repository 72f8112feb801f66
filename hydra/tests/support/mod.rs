use hydra::{Asset, HydraBuilder};
use hydra_instrument::{BrokerId, ExchangeId};
use rust_decimal::Decimal;

/// Builds a single-asset, single-exchange, single-broker `HydraBuilder`
/// with `master` funded at `cash`, ready for `register_strategy` and
/// `build`. `rows` is `(timestamp_ns, open, close)` per bar.
pub fn single_asset_builder(asset_id: &str, rows: &[(i64, Decimal, Decimal)], cash: Decimal) -> HydraBuilder {
    let mut builder = HydraBuilder::new(cash);
    builder.new_exchange("NYSE");
    builder.new_broker("b1", "OPEN", "CLOSE");

    let timestamps = rows.iter().map(|(ts, _, _)| *ts).collect();
    let data = rows.iter().map(|(_, open, close)| vec![*open, *close]).collect();
    let asset = Asset::from_columns(asset_id, vec!["OPEN".into(), "CLOSE".into()], data, timestamps, 0).unwrap();

    builder.register_asset(asset, &ExchangeId::from("NYSE"), &BrokerId::from("b1")).unwrap();
    builder
}

pub fn exchange_id() -> ExchangeId {
    ExchangeId::from("NYSE")
}

pub fn broker_id() -> BrokerId {
    BrokerId::from("b1")
}
