use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(SmolStr);

        impl $name {
            pub fn new(id: impl Into<SmolStr>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

string_id!(AssetId, "Unique identifier of an [`Asset`] within a Hydra instance.");
string_id!(ExchangeId, "Unique identifier of an [`Exchange`] within a Hydra instance.");
string_id!(BrokerId, "Unique identifier of a [`Broker`] within a Hydra instance.");
string_id!(PortfolioId, "Unique identifier of a [`Portfolio`] within a Hydra instance.");
string_id!(StrategyId, "Unique identifier of a registered [`Strategy`].");

/// Monotonically increasing identifier assigned to every [`Order`] a
/// [`Broker`] accepts, in submission order.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

/// Monotonically increasing identifier assigned to every [`Trade`] a fill
/// produces, in fill order.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

/// Simple counter used to hand out monotonic [`OrderId`]/[`TradeId`] values.
///
/// Kept as a plain `AtomicU64` rather than a `Cell<u64>` so it can sit behind
/// a shared reference inside the single-threaded kernel without a `RefCell`
/// borrow-check dance; there is never more than one thread, so `Relaxed`
/// ordering is sufficient.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
