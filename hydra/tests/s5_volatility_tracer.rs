use hydra_instrument::AssetId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "expected {expected} within {tolerance}, got {actual} (diff {diff})"
    );
}

/// Population variance of a window of simple returns, computed by a
/// straightforward two-pass mean/sum-of-squared-deviations method - a
/// different code path than the engine's incremental running-sum
/// accumulator, so this is a genuine cross-check rather than a
/// restatement of the same formula.
fn reference_population_variance(returns: &[Decimal]) -> Decimal {
    let n = Decimal::from(returns.len());
    let mean = returns.iter().copied().sum::<Decimal>() / n;
    let sum_sq_dev: Decimal = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum();
    sum_sq_dev / n
}

fn simple_returns(closes: &[Decimal]) -> Vec<Decimal> {
    closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

#[test]
fn volatility_tracer_matches_independently_computed_population_variance() {
    let closes = vec![dec!(100), dec!(102), dec!(101), dec!(105), dec!(103), dec!(108), dec!(107)];
    let rows: Vec<(i64, Decimal, Decimal)> = closes.iter().enumerate().map(|(i, c)| (i as i64 + 1, *c, *c)).collect();

    let asset = hydra::Asset::from_columns(
        "SPY",
        vec!["OPEN".into(), "CLOSE".into()],
        rows.iter().map(|(_, o, c)| vec![*o, *c]).collect(),
        rows.iter().map(|(ts, _, _)| *ts).collect(),
        0,
    )
    .unwrap()
    .with_volatility_tracer("CLOSE", 3)
    .unwrap();

    let mut builder = hydra::HydraBuilder::new(dec!(10000));
    builder.new_exchange("NYSE");
    builder.new_broker("b1", "OPEN", "CLOSE");
    builder
        .register_asset(asset, &hydra_instrument::ExchangeId::from("NYSE"), &hydra_instrument::BrokerId::from("b1"))
        .unwrap();

    let mut hydra = builder.build().unwrap();

    let all_returns = simple_returns(&closes);
    // After the asset's `call`-th step its current_index equals `call`
    // (0-indexed: the first step moves it from -1 to 0), and exactly
    // `call` returns have been pushed (none at index 0, one per step past
    // it) - so `all_returns[0..call]` is what the tracer's window is
    // drawn from, most recent 3 once it's full.
    for call in 0..closes.len() {
        hydra.step();
        let returns_seen = call;
        if returns_seen < 3 {
            continue;
        }
        let window = &all_returns[returns_seen - 3..returns_seen];
        let expected = reference_population_variance(window);
        let actual = hydra
            .exchange_asset_volatility(&hydra_instrument::ExchangeId::from("NYSE"), &AssetId::from("SPY"))
            .expect("window has filled by this step");
        assert_close(actual, expected, dec!(0.000001));
    }
}
