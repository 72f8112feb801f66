use hydra_instrument::DataError;
use hydra_strategy::InvalidStrategy;
use hydra_tracer::TracerError;
use thiserror::Error;

/// Configuration errors. These abort `build()` or whichever registration
/// call produced them; they never occur mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown asset `{0}`")]
    UnknownAsset(String),

    #[error("unknown exchange `{0}`")]
    UnknownExchange(String),

    #[error("unknown broker `{0}`")]
    UnknownBroker(String),

    #[error("unknown portfolio `{0}`")]
    UnknownPortfolio(String),

    #[error("invalid strategy: {0}")]
    InvalidStrategy(#[from] InvalidStrategy),

    #[error("id `{0}` is already registered")]
    DuplicateId(String),

    #[error("Hydra has not been built yet")]
    NotBuilt,

    #[error("Hydra has already been built")]
    AlreadyBuilt,
}

/// The top-level error type returned by Hydra's public query and control
/// surface. Runtime match failures are not part of this enum - they
/// reject the order and are recorded on the EVENT tracer instead of
/// raising.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydraError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Tracer(#[from] TracerError),
}
