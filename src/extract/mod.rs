//! Condition signal extraction.
//!
//! Three independent extractors observe a listing and emit at most one
//! `ConditionSignal` each:
//! - text: localized condition phrases in title/description
//! - image: defect analysis through the vision collaborator
//! - rank: seller-declared structured rank codes
//!
//! The contract is uniform and infallible: malformed or missing input
//! yields no signal, never an error. Fusion consumes only the
//! `(grade, confidence)` contract and is independent of extractor
//! identity.

pub mod image;
pub mod rank;
pub mod text;

use async_trait::async_trait;

use crate::types::{ConditionSignal, Listing, SignalSource};

/// Capability: observe a listing, emit zero-or-one condition signal.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    /// Inspect the listing. `None` means "nothing to report", which is
    /// a normal outcome, not a failure.
    async fn observe(&self, listing: &Listing) -> Option<ConditionSignal>;

    /// Which signal kind this extractor produces.
    fn source(&self) -> SignalSource;
}
