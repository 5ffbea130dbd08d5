//! Risk Profile Repository Trait

use async_trait::async_trait;

use super::value_objects::RiskProfile;
use crate::domain::order_execution::RepositoryError;
use crate::domain::shared::UserId;

/// Repository trait for risk profiles (at most one per user).
#[async_trait]
pub trait RiskProfileRepository: Send + Sync {
    /// Find a user's profile.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<RiskProfile>, RepositoryError>;

    /// Insert or replace a user's profile.
    ///
    /// # Errors
    ///
    /// Returns error if persistence fails.
    async fn upsert(&self, profile: &RiskProfile) -> Result<(), RepositoryError>;
}
