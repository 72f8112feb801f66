use hydra_instrument::{AssetId, DataError};
use hydra_tracer::{RollingVariance, TracerError};
use indexmap::IndexMap;
use rust_decimal::Decimal;

/// A rolling feature tracked directly on an [`Asset`], computed from the
/// simple returns of one of its columns.
#[derive(Debug, Clone)]
struct VolatilityTracer {
    column: usize,
    variance: RollingVariance,
}

/// A single instrument's historical panel: a dense, row-major matrix of
/// `Decimal` values indexed by timestamp and column name.
///
/// `current_index` starts at `-1`, meaning "before the first row"; each
/// call to [`Asset::step`] advances it by one. Rows before `warmup` are
/// loaded and readable but are not eligible for tracer readiness or
/// strategy dispatch (see the `Exchange`/`Hydra` active-set machinery).
#[derive(Debug, Clone)]
pub struct Asset {
    asset_id: AssetId,
    timestamps: Vec<i64>,
    columns: IndexMap<String, usize>,
    /// Flat row-major storage: `data[row * columns.len() + column]`.
    data: Vec<Decimal>,
    warmup: usize,
    current_index: i64,
    volatility: Option<VolatilityTracer>,
}

impl Asset {
    /// Construct an asset from already-extracted tabular data. This plays
    /// the role an external data-frame loader plays in production - no
    /// pandas/Arrow/CSV parsing happens inside this crate.
    pub fn from_columns(
        asset_id: impl Into<AssetId>,
        headers: Vec<String>,
        rows: Vec<Vec<Decimal>>,
        timestamps_ns: Vec<i64>,
        warmup: usize,
    ) -> Result<Self, DataError> {
        let columns: IndexMap<String, usize> =
            headers.into_iter().enumerate().map(|(i, h)| (h, i)).collect();

        if rows.len() != timestamps_ns.len() {
            return Err(DataError::ShapeMismatch {
                rows: timestamps_ns.len(),
                row_values: rows.len(),
                columns: columns.len(),
            });
        }

        for (i, window) in timestamps_ns.windows(2).enumerate() {
            if window[1] <= window[0] {
                return Err(DataError::UnsortedTimestamps {
                    row: i + 1,
                    previous: window[0],
                    current: window[1],
                });
            }
        }

        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(DataError::ShapeMismatch {
                    rows: timestamps_ns.len(),
                    row_values: row.len(),
                    columns: columns.len(),
                });
            }
            data.extend(row);
        }

        Ok(Self {
            asset_id: asset_id.into(),
            timestamps: timestamps_ns,
            columns,
            data,
            warmup,
            current_index: -1,
            volatility: None,
        })
    }

    /// Attach a rolling population-variance tracer over the simple returns
    /// of `column`.
    pub fn with_volatility_tracer(mut self, column: &str, window: usize) -> Result<Self, DataError> {
        let idx = self.column_index(column)?;
        self.volatility = Some(VolatilityTracer { column: idx, variance: RollingVariance::new(window) });
        Ok(self)
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn current_timestamp(&self) -> Option<i64> {
        self.row_at(self.current_index)
    }

    /// The timestamp of the row this asset would move to on its next
    /// `step`, used by an owning `Exchange` to decide whether to step it.
    pub fn next_timestamp(&self) -> Option<i64> {
        self.row_at(self.current_index + 1)
    }

    pub fn timestamps_slice(&self) -> &[i64] {
        &self.timestamps
    }

    fn row_at(&self, row: i64) -> Option<i64> {
        if row < 0 {
            return None;
        }
        self.timestamps.get(row as usize).copied()
    }

    fn column_index(&self, column: &str) -> Result<usize, DataError> {
        self.columns
            .get(column)
            .copied()
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))
    }

    /// Reads `column` at `relative_row` rows before the current row.
    /// `relative_row` must be zero (the current row) or negative (a past
    /// row); positive values are undefined and rejected.
    pub fn get(&self, column: &str, relative_row: i64) -> Result<Decimal, DataError> {
        if relative_row > 0 {
            return Err(DataError::InvalidRelativeRow(relative_row));
        }
        let col = self.column_index(column)?;
        self.get_column(col, relative_row)
    }

    fn get_column(&self, column: usize, relative_row: i64) -> Result<Decimal, DataError> {
        if relative_row > 0 {
            return Err(DataError::InvalidRelativeRow(relative_row));
        }
        let target_row = self.current_index + relative_row;
        if target_row < 0 {
            return Err(DataError::InvalidRelativeRow(relative_row));
        }
        let row = target_row as usize;
        Ok(self.data[row * self.columns.len() + column])
    }

    /// Whether `current_index` is at or past the warmup boundary - i.e.
    /// this asset is eligible for tracer readiness and strategy dispatch.
    pub fn is_warmed_up(&self) -> bool {
        self.current_index >= self.warmup as i64
    }

    /// Advance to the next row, if any, and update the volatility tracer.
    /// Returns `false` once the asset has been exhausted.
    pub fn step(&mut self) -> bool {
        if self.current_index + 1 >= self.timestamps.len() as i64 {
            return false;
        }
        self.current_index += 1;

        if self.is_warmed_up() && self.current_index > 0 {
            if let Some(tracer) = &mut self.volatility {
                let prev = self.get_column(tracer.column, -1);
                let curr = self.get_column(tracer.column, 0);
                if let (Ok(prev), Ok(curr)) = (prev, curr) {
                    if !prev.is_zero() {
                        let simple_return = (curr - prev) / prev;
                        tracer.variance.push(simple_return);
                    }
                }
            }
        }

        true
    }

    /// Rolling population variance of simple returns, if a volatility
    /// tracer is attached and its window has filled.
    pub fn volatility(&self) -> Result<Decimal, TracerError> {
        match &self.volatility {
            Some(tracer) => tracer.variance.value(),
            None => Err(TracerError { have: 0, need: 1 }),
        }
    }

    /// Returns the cursor and any attached tracer to the post-build initial
    /// state - `current_index` back to `-1`, volatility window emptied.
    /// The underlying panel itself never changes shape or values.
    pub fn reset(&mut self) {
        self.current_index = -1;
        if let Some(tracer) = &mut self.volatility {
            tracer.variance = RollingVariance::new(tracer.variance.window());
        }
    }
}
