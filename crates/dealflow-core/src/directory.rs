//! Collaborator traits for the records the engines read and write.

use crate::error::DealflowError;
use crate::ids::{ContactId, DealId, OwnerId};
use crate::types::{Contact, Deal};
use async_trait::async_trait;

/// Owner-scoped, read-only contact lookup.
///
/// Implementations must enforce owner scoping themselves; the engines trust
/// every returned contact as already authorized.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Contacts owned by `owner` whose id is in `ids`. Unknown or foreign ids
    /// are omitted, never reported.
    async fn find_owned_contacts(
        &self,
        owner: &OwnerId,
        ids: &[ContactId],
    ) -> Result<Vec<Contact>, DealflowError>;

    async fn find_owned_contact(
        &self,
        owner: &OwnerId,
        id: &ContactId,
    ) -> Result<Option<Contact>, DealflowError> {
        let mut found = self
            .find_owned_contacts(owner, std::slice::from_ref(id))
            .await?;
        Ok(found.pop())
    }
}

/// Persistence for single deal records.
///
/// `get_deal` is unscoped; the pipeline engine tells a
/// missing deal from a foreign one and applies its ownership policy.
#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn get_deal(&self, id: &DealId) -> Result<Option<Deal>, DealflowError>;

    /// Insert or replace. Last writer wins.
    async fn save_deal(&self, deal: Deal) -> Result<(), DealflowError>;

    async fn list_deals(&self, owner: &OwnerId) -> Result<Vec<Deal>, DealflowError>;
}
