use crate::error::TracerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;

/// Floor applied to the index-return variance denominator in [`RollingBeta`]
/// to avoid a near-zero division blowing up the ratio.
const BETA_VARIANCE_FLOOR: Decimal = dec!(0.000001);

/// Rolling population variance of a simple-return series over a fixed
/// window, computed incrementally as `sum(r^2)/N - (sum(r)/N)^2`.
#[derive(Debug, Clone)]
pub struct RollingVariance {
    window: usize,
    returns: VecDeque<Decimal>,
    sum: Decimal,
    sum_sq: Decimal,
}

impl RollingVariance {
    pub fn new(window: usize) -> Self {
        assert!(window > 1, "variance window must cover at least two returns");
        Self {
            window,
            returns: VecDeque::with_capacity(window),
            sum: Decimal::ZERO,
            sum_sq: Decimal::ZERO,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Push a new simple return into the window, evicting the oldest one
    /// once the window is full.
    pub fn push(&mut self, simple_return: Decimal) {
        self.returns.push_back(simple_return);
        self.sum += simple_return;
        self.sum_sq += simple_return * simple_return;

        if self.returns.len() > self.window {
            if let Some(evicted) = self.returns.pop_front() {
                self.sum -= evicted;
                self.sum_sq -= evicted * evicted;
            }
        }
    }

    /// Population variance of the returns currently in the window.
    ///
    /// Returns [`TracerError::NotReady`] until the window has filled.
    pub fn value(&self) -> Result<Decimal, TracerError> {
        if self.returns.len() < self.window {
            return Err(TracerError { have: self.returns.len(), need: self.window });
        }

        let n = Decimal::from(self.window);
        let mean = self.sum / n;
        let mean_sq = self.sum_sq / n;
        Ok(mean_sq - mean * mean)
    }
}

/// Rolling beta of an asset's simple returns against an index asset's
/// simple returns, computed as `cov(asset, index) / var(index)` over a
/// fixed window.
#[derive(Debug, Clone)]
pub struct RollingBeta {
    window: usize,
    pairs: VecDeque<(Decimal, Decimal)>,
    sum_asset: Decimal,
    sum_index: Decimal,
    sum_asset_index: Decimal,
    sum_index_sq: Decimal,
}

impl RollingBeta {
    pub fn new(window: usize) -> Self {
        assert!(window > 1, "beta window must cover at least two returns");
        Self {
            window,
            pairs: VecDeque::with_capacity(window),
            sum_asset: Decimal::ZERO,
            sum_index: Decimal::ZERO,
            sum_asset_index: Decimal::ZERO,
            sum_index_sq: Decimal::ZERO,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn push(&mut self, asset_return: Decimal, index_return: Decimal) {
        self.pairs.push_back((asset_return, index_return));
        self.sum_asset += asset_return;
        self.sum_index += index_return;
        self.sum_asset_index += asset_return * index_return;
        self.sum_index_sq += index_return * index_return;

        if self.pairs.len() > self.window {
            if let Some((a, i)) = self.pairs.pop_front() {
                self.sum_asset -= a;
                self.sum_index -= i;
                self.sum_asset_index -= a * i;
                self.sum_index_sq -= i * i;
            }
        }
    }

    pub fn value(&self) -> Result<Decimal, TracerError> {
        if self.pairs.len() < self.window {
            return Err(TracerError { have: self.pairs.len(), need: self.window });
        }

        let n = Decimal::from(self.window);
        let mean_asset = self.sum_asset / n;
        let mean_index = self.sum_index / n;
        let covariance = self.sum_asset_index / n - mean_asset * mean_index;
        let variance_index = self.sum_index_sq / n - mean_index * mean_index;

        let denominator = if variance_index.abs() < BETA_VARIANCE_FLOOR {
            BETA_VARIANCE_FLOOR
        } else {
            variance_index
        };

        Ok(covariance / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_not_ready_until_window_fills() {
        let mut tracer = RollingVariance::new(3);
        tracer.push(dec!(0.01));
        tracer.push(dec!(-0.02));
        assert_eq!(tracer.value(), Err(TracerError { have: 2, need: 3 }));
        tracer.push(dec!(0.015));
        assert!(tracer.value().is_ok());
    }

    #[test]
    fn variance_matches_population_formula() {
        let mut tracer = RollingVariance::new(4);
        for r in [dec!(0.01), dec!(0.02), dec!(-0.01), dec!(0.00)] {
            tracer.push(r);
        }
        let mean = (dec!(0.01) + dec!(0.02) - dec!(0.01) + dec!(0.00)) / dec!(4);
        let expected = ((dec!(0.01) - mean).powi(2)
            + (dec!(0.02) - mean).powi(2)
            + (dec!(-0.01) - mean).powi(2)
            + (dec!(0.00) - mean).powi(2))
            / dec!(4);
        assert_eq!(tracer.value().unwrap(), expected);
    }

    #[test]
    fn variance_window_slides() {
        let mut tracer = RollingVariance::new(2);
        tracer.push(dec!(0.01));
        tracer.push(dec!(0.01));
        assert_eq!(tracer.value().unwrap(), Decimal::ZERO);
        tracer.push(dec!(0.03));
        // window now holds (0.01, 0.03), not (0.01, 0.01, 0.03)
        let mean = dec!(0.02);
        let expected = ((dec!(0.01) - mean).powi(2) + (dec!(0.03) - mean).powi(2)) / dec!(2);
        assert_eq!(tracer.value().unwrap(), expected);
    }

    #[test]
    fn beta_of_series_against_itself_is_one() {
        let mut tracer = RollingBeta::new(3);
        for r in [dec!(0.01), dec!(-0.02), dec!(0.03)] {
            tracer.push(r, r);
        }
        assert_eq!(tracer.value().unwrap(), Decimal::ONE);
    }

    #[test]
    fn beta_flat_index_is_floored_not_blown_up() {
        let mut tracer = RollingBeta::new(3);
        for r in [dec!(0.01), dec!(-0.02), dec!(0.03)] {
            tracer.push(r, Decimal::ZERO);
        }
        // index has zero variance; denominator floors instead of dividing by zero
        assert!(tracer.value().is_ok());
    }
}
