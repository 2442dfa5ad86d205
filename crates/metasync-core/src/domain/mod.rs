//! Canonical TFT metagame model.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TeamComp`] | Team composition with placement statistics |
//! | [`Champion`] | Unit inside a composition |
//! | [`Item`] | Component or completed item |
//! | [`Augment`] | Augment with tier and synergies |
//! | [`DataModel`] | Entities plus sync metadata |
//! | [`CacheKey`] | `(domain, source, patch)` |
//! | [`UtcDateTime`] | UTC timestamp |

mod dataset;
mod models;
mod timestamp;

pub use dataset::{
    CacheKey, Canonical, DataModel, Dataset, Domain, ModelMetadata, Patch, SCHEMA_VERSION,
};
pub use models::{Augment, AugmentTier, Champion, Item, TeamComp};
pub use timestamp::UtcDateTime;
