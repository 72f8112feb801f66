use thiserror::Error;

/// Errors raised while loading tabular data into an `Asset`.
///
/// These are fatal for the asset being loaded - they are never recovered
/// from mid-simulation, only surfaced to whoever is constructing the
/// Hydra instance before `build()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("timestamps are not strictly increasing at row {row}: {previous} >= {current}")]
    UnsortedTimestamps { row: usize, previous: i64, current: i64 },

    #[error("data shape mismatch: {rows} timestamps but {row_values} rows of values ({columns} columns expected)")]
    ShapeMismatch { rows: usize, row_values: usize, columns: usize },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("relative_row must be zero or negative, got {0}")]
    InvalidRelativeRow(i64),
}
