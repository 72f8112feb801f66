use crate::asset::Asset;
use crate::error::{ConfigError, HydraError};
use hydra_instrument::{AssetId, DataError, ExchangeId};
use hydra_tracer::RollingBeta;
use indexmap::IndexMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Selects which subset of an exchange's active assets a feature query
/// returns, for a given feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeQueryType {
    /// Every active asset.
    All,
    /// The `n` active assets with the largest feature value.
    NLargest(usize),
    /// The `n` active assets with the smallest feature value.
    NSmallest(usize),
}

struct BetaTracker {
    column: usize,
    beta: RollingBeta,
}

/// Groups a set of [`Asset`]s under one trading venue and merges their
/// timestamps into a single global clock.
///
/// `current_index` indexes into the merged datetime index, not into any
/// one asset's own row index. An asset whose own timestamps don't include
/// the current merged timestamp is "inactive" for that step and simply
/// retains whatever row it last stepped to.
pub struct Exchange {
    exchange_id: ExchangeId,
    assets: IndexMap<AssetId, Asset>,
    merged_index: Vec<i64>,
    current_index: i64,
    active: Vec<AssetId>,
    index_asset: Option<AssetId>,
    beta_trackers: HashMap<AssetId, BetaTracker>,
}

impl Exchange {
    pub fn new(exchange_id: impl Into<ExchangeId>) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            assets: IndexMap::new(),
            merged_index: Vec::new(),
            current_index: -1,
            active: Vec::new(),
            index_asset: None,
            beta_trackers: HashMap::new(),
        }
    }

    pub fn exchange_id(&self) -> &ExchangeId {
        &self.exchange_id
    }

    pub fn add_asset(&mut self, asset: Asset) {
        self.assets.insert(asset.asset_id().clone(), asset);
    }

    pub fn set_index_asset(&mut self, asset_id: AssetId) {
        self.index_asset = Some(asset_id);
    }

    pub fn index_asset(&self) -> Option<&AssetId> {
        self.index_asset.as_ref()
    }

    pub fn asset(&self, asset_id: &AssetId) -> Option<&Asset> {
        self.assets.get(asset_id)
    }

    /// Attach a rolling beta tracker on `asset_id` against the exchange's
    /// `index_asset`, computed from `column` on both series.
    pub fn with_beta_tracker(mut self, asset_id: &AssetId, column: &str, window: usize) -> Result<Self, HydraError> {
        let asset = self
            .assets
            .get(asset_id)
            .ok_or_else(|| ConfigError::UnknownAsset(asset_id.as_str().to_string()))?;
        let col = asset
            .headers()
            .position(|h| h == column)
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))?;
        self.beta_trackers.insert(asset_id.clone(), BetaTracker { column: col, beta: RollingBeta::new(window) });
        Ok(self)
    }

    /// Compute the merged, sorted-unique union of every member asset's
    /// timestamps. Must be called once, before the first `step`.
    pub fn build(&mut self) {
        let mut merged: Vec<i64> = self.assets.values().flat_map(|a| a.timestamps_slice()).copied().collect();
        merged.sort_unstable();
        merged.dedup();
        self.merged_index = merged;
        self.current_index = -1;
        self.active.clear();
    }

    pub fn merged_index(&self) -> &[i64] {
        &self.merged_index
    }

    pub fn current_timestamp(&self) -> Option<i64> {
        if self.current_index < 0 {
            return None;
        }
        self.merged_index.get(self.current_index as usize).copied()
    }

    /// The timestamp `step` would advance to next, without mutating
    /// anything - used by `Hydra::run_to` to decide whether to take one
    /// more step without committing to it.
    pub fn peek_next_timestamp(&self) -> Option<i64> {
        self.merged_index.get((self.current_index + 1) as usize).copied()
    }

    pub fn active_set(&self) -> &[AssetId] {
        &self.active
    }

    pub fn is_active(&self, asset_id: &AssetId) -> bool {
        self.active.contains(asset_id)
    }

    /// Advance the merged clock by one row, stepping every member asset
    /// whose own next timestamp matches, and leaving the rest untouched.
    /// Returns `false` once the merged index is exhausted.
    pub fn step(&mut self) -> bool {
        if self.current_index + 1 >= self.merged_index.len() as i64 {
            return false;
        }
        self.current_index += 1;
        let ts = self.merged_index[self.current_index as usize];

        self.active.clear();
        for (asset_id, asset) in self.assets.iter_mut() {
            if asset.next_timestamp() == Some(ts) {
                asset.step();
                self.active.push(asset_id.clone());
            }
        }
        self.active.sort();

        self.update_beta_trackers();
        true
    }

    fn update_beta_trackers(&mut self) {
        let Some(index_asset_id) = self.index_asset.clone() else { return };
        if !self.active.contains(&index_asset_id) {
            return;
        }

        for (asset_id, tracker) in self.beta_trackers.iter_mut() {
            if !self.active.contains(asset_id) {
                continue;
            }
            let Some(asset) = self.assets.get(asset_id) else { continue };
            let Some(index_asset) = self.assets.get(&index_asset_id) else { continue };

            if let (Ok(asset_return), Ok(index_return)) = (
                simple_return(asset, tracker.column),
                simple_return(index_asset, tracker.column),
            ) {
                tracker.beta.push(asset_return, index_return);
            }
        }
    }

    pub fn beta(&self, asset_id: &AssetId) -> Result<Decimal, hydra_tracer::TracerError> {
        match self.beta_trackers.get(asset_id) {
            Some(tracker) => tracker.beta.value(),
            None => Err(hydra_tracer::TracerError { have: 0, need: 1 }),
        }
    }

    /// Returns the merged clock, every member asset, and every beta
    /// tracker to the post-build initial state.
    pub fn reset(&mut self) {
        self.current_index = -1;
        self.active.clear();
        for asset in self.assets.values_mut() {
            asset.reset();
        }
        for tracker in self.beta_trackers.values_mut() {
            tracker.beta = RollingBeta::new(tracker.beta.window());
        }
    }

    /// Reads `column` for `asset_id` at `relative_row` rows before its own
    /// current row.
    pub fn get_asset_feature(&self, asset_id: &AssetId, column: &str, relative_row: i64) -> Result<Decimal, HydraError> {
        let asset = self
            .assets
            .get(asset_id)
            .ok_or_else(|| ConfigError::UnknownAsset(asset_id.as_str().to_string()))?;
        Ok(asset.get(column, relative_row)?)
    }

    /// Reads `column` at the current row for every active asset, returning
    /// the subset selected by `query_type`. Ties break on asset_id
    /// lexicographic order.
    pub fn get_exchange_feature(&self, column: &str, query_type: ExchangeQueryType) -> Result<Vec<(AssetId, Decimal)>, DataError> {
        let mut values = Vec::with_capacity(self.active.len());
        for asset_id in &self.active {
            let asset = &self.assets[asset_id];
            values.push((asset_id.clone(), asset.get(column, 0)?));
        }

        let selected = match query_type {
            ExchangeQueryType::All => {
                values.sort_by(|a, b| a.0.cmp(&b.0));
                values
            }
            ExchangeQueryType::NLargest(n) => values
                .into_iter()
                .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
                .take(n)
                .collect(),
            ExchangeQueryType::NSmallest(n) => values
                .into_iter()
                .sorted_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
                .take(n)
                .collect(),
        };
        Ok(selected)
    }
}

fn simple_return(asset: &Asset, column: usize) -> Result<Decimal, DataError> {
    let header = asset.headers().nth(column).expect("column index in range");
    let prev = asset.get(header, -1)?;
    let curr = asset.get(header, 0)?;
    if prev.is_zero() {
        return Err(DataError::UnknownColumn(header.to_string()));
    }
    Ok((curr - prev) / prev)
}
