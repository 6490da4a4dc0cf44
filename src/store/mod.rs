//! Read-only access to the consent, profile and interaction tables.
//!
//! The pipeline never writes through this interface.

pub mod rest;
pub mod snapshot;

pub use rest::RestStore;
pub use snapshot::{Snapshot, SnapshotStore};

use crate::error::StoreError;
use crate::models::{ConsentRecord, InteractionRecord, Period, ProfileRecord};
use async_trait::async_trait;

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Current consent entries. Callers re-apply the eligibility rule.
    async fn consents(&self) -> Result<Vec<ConsentRecord>, StoreError>;

    /// Profiles with completed registration created within `period`.
    async fn completed_profiles(&self, period: &Period) -> Result<Vec<ProfileRecord>, StoreError>;

    /// Interactions of `subjects` logged within `period`.
    async fn interactions(
        &self,
        subjects: &[String],
        period: &Period,
    ) -> Result<Vec<InteractionRecord>, StoreError>;
}
