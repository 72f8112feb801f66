use thiserror::Error;

/// Raised when a rolling tracer is queried before its window has filled.
///
/// Never fatal - callers either propagate it for the current step or
/// ignore the feature until enough history has accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tracer not ready: have {have} samples, need {need}")]
pub struct TracerError {
    pub have: usize,
    pub need: usize,
}
