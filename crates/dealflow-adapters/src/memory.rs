use async_trait::async_trait;
use dealflow_core::directory::{DealRepository, RecipientDirectory};
use dealflow_core::error::DealflowError;
use dealflow_core::ids::{ContactId, DealId, OwnerId};
use dealflow_core::types::{Contact, Deal};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local contact directory.
///
/// Email addresses are unique per owner, compared case-insensitively.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    contacts: RwLock<HashMap<ContactId, Contact>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_contact(&self, mut contact: Contact) -> Result<Contact, DealflowError> {
        if contact.first_name.trim().is_empty() || contact.last_name.trim().is_empty() {
            return Err(DealflowError::invalid("first and last name are required"));
        }
        contact.email = contact.email.trim().to_ascii_lowercase();
        if !looks_like_email(&contact.email) {
            return Err(DealflowError::InvalidInput(format!(
                "invalid email '{}'",
                contact.email
            )));
        }

        let mut contacts = self.contacts.write().await;
        let duplicate = contacts
            .values()
            .any(|c| c.owner == contact.owner && c.email == contact.email && c.id != contact.id);
        if duplicate {
            return Err(DealflowError::invalid(
                "contact with this email already exists",
            ));
        }

        contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    pub async fn contacts_for(&self, owner: &OwnerId) -> Vec<Contact> {
        let mut owned: Vec<Contact> = self
            .contacts
            .read()
            .await
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    pub async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contacts.read().await.is_empty()
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn find_owned_contacts(
        &self,
        owner: &OwnerId,
        ids: &[ContactId],
    ) -> Result<Vec<Contact>, DealflowError> {
        let contacts = self.contacts.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| contacts.get(id))
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect())
    }
}

/// Process-local deal store. Saves replace the whole record.
#[derive(Debug, Default)]
pub struct InMemoryDealRepository {
    deals: RwLock<HashMap<DealId, Deal>>,
}

impl InMemoryDealRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.deals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.deals.read().await.is_empty()
    }
}

#[async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn get_deal(&self, id: &DealId) -> Result<Option<Deal>, DealflowError> {
        Ok(self.deals.read().await.get(id).cloned())
    }

    async fn save_deal(&self, deal: Deal) -> Result<(), DealflowError> {
        self.deals.write().await.insert(deal.id, deal);
        Ok(())
    }

    async fn list_deals(&self, owner: &OwnerId) -> Result<Vec<Deal>, DealflowError> {
        Ok(self
            .deals
            .read()
            .await
            .values()
            .filter(|deal| deal.is_owned_by(owner))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn email_is_unique_per_owner() {
        let directory = InMemoryDirectory::new();
        let owner = OwnerId::generate();
        directory
            .insert_contact(Contact::new(owner, "Ada", "Lovelace", "ada@example.com"))
            .await
            .unwrap();

        let err = directory
            .insert_contact(Contact::new(owner, "Ada", "Byron", "ADA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DealflowError::InvalidInput(_)));

        directory
            .insert_contact(Contact::new(
                OwnerId::generate(),
                "Ada",
                "Lovelace",
                "ada@example.com",
            ))
            .await
            .unwrap();
        assert_eq!(directory.len().await, 2);
    }

    #[tokio::test]
    async fn rejects_malformed_contacts() {
        let directory = InMemoryDirectory::new();
        let owner = OwnerId::generate();
        for contact in [
            Contact::new(owner, "", "Lovelace", "ada@example.com"),
            Contact::new(owner, "Ada", "Lovelace", "not-an-email"),
            Contact::new(owner, "Ada", "Lovelace", "@example.com"),
        ] {
            assert!(directory.insert_contact(contact).await.is_err());
        }
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn lookup_is_owner_scoped() {
        let directory = InMemoryDirectory::new();
        let owner = OwnerId::generate();
        let mine = directory
            .insert_contact(Contact::new(owner, "Ada", "Lovelace", "ada@example.com"))
            .await
            .unwrap();
        let theirs = directory
            .insert_contact(Contact::new(
                OwnerId::generate(),
                "Alan",
                "Turing",
                "alan@example.com",
            ))
            .await
            .unwrap();

        let found = directory
            .find_owned_contacts(&owner, &[mine.id, theirs.id, ContactId::generate()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);

        assert!(directory
            .find_owned_contact(&owner, &theirs.id)
            .await
            .unwrap()
            .is_none());
    }
}
