use thiserror::Error;

/// A strategy rejected itself during `build`, or was rejected by the
/// registry before `build` ran (missing id, already built).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStrategy {
    #[error("strategy referenced unknown portfolio `{0}`")]
    UnknownPortfolio(String),

    #[error("strategy referenced unknown broker `{0}`")]
    UnknownBroker(String),

    #[error("strategy referenced unknown exchange `{0}`")]
    UnknownExchange(String),

    #[error("strategy build() rejected itself: {0}")]
    Rejected(String),
}
