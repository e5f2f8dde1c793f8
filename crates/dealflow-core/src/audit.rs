use crate::error::DealflowError;
use crate::ids::{ContactId, LogEntryId, OwnerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Outcome recorded for one send attempt.
///
/// Only `Sent` and `Failed` are produced by the dispatch engine; the delivery
/// states are reserved for provider callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    Failed,
    Delivered,
    Opened,
    Clicked,
    Bounced,
}

impl DispatchStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Bounced => "bounced",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DispatchStatus {
    type Err = DealflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "delivered" => Ok(Self::Delivered),
            "opened" => Ok(Self::Opened),
            "clicked" => Ok(Self::Clicked),
            "bounced" => Ok(Self::Bounced),
            other => Err(DealflowError::InvalidInput(format!(
                "invalid status '{other}'; expected one of: sent, failed, delivered, opened, clicked, bounced"
            ))),
        }
    }
}

/// Immutable record of one send attempt.
///
/// `recipient` is the address captured at send time, so history survives a
/// later change to the contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLogEntry {
    pub id: LogEntryId,
    pub contact: ContactId,
    pub sender: OwnerId,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub status: DispatchStatus,
    pub provider: String,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DispatchLogEntry {
    pub fn sent(
        attempt: &DispatchAttempt<'_>,
        provider: &str,
        provider_id: impl Into<String>,
    ) -> Self {
        Self::build(attempt, provider, DispatchStatus::Sent, Some(provider_id.into()), None)
    }

    pub fn failed(attempt: &DispatchAttempt<'_>, provider: &str, error: impl Into<String>) -> Self {
        Self::build(attempt, provider, DispatchStatus::Failed, None, Some(error.into()))
    }

    fn build(
        attempt: &DispatchAttempt<'_>,
        provider: &str,
        status: DispatchStatus,
        provider_id: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: LogEntryId::generate(),
            contact: attempt.contact,
            sender: attempt.sender,
            recipient: attempt.recipient.to_string(),
            subject: attempt.subject.to_string(),
            message: attempt.message.to_string(),
            status,
            provider: provider.to_string(),
            provider_id,
            error,
            created_at: Utc::now(),
        }
    }
}

/// The fields shared by every log entry of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct DispatchAttempt<'a> {
    pub contact: ContactId,
    pub sender: OwnerId,
    pub recipient: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
}

/// History filter. `sender` is mandatory so reads never cross owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub sender: OwnerId,
    pub contact: Option<ContactId>,
    pub status: Option<DispatchStatus>,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
}

impl AuditQuery {
    pub fn for_sender(sender: OwnerId) -> Self {
        Self {
            sender,
            contact: None,
            status: None,
            page: 1,
            limit: 20,
        }
    }

    pub fn with_contact(mut self, contact: ContactId) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_status(mut self, status: DispatchStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn paginate(mut self, page: usize, limit: usize) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn matches(&self, entry: &DispatchLogEntry) -> bool {
        entry.sender == self.sender
            && self.contact.map_or(true, |contact| entry.contact == contact)
            && self.status.map_or(true, |status| entry.status == status)
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<DispatchLogEntry>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl AuditPage {
    pub fn new(entries: Vec<DispatchLogEntry>, query: &AuditQuery, total: usize) -> Self {
        let pages = if query.limit == 0 {
            0
        } else {
            total.div_ceil(query.limit)
        };
        Self {
            entries,
            page: query.page,
            limit: query.limit,
            total,
            pages,
        }
    }
}

/// Append-only persistence for dispatch log entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    fn backend_label(&self) -> &'static str;

    async fn append(&self, entry: DispatchLogEntry) -> Result<(), DealflowError>;

    /// Matching entries ordered newest first, sliced to the requested page.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, DealflowError>;
}

/// Process-local audit log.
///
/// There is no update or delete API: every attempt becomes one more record.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<DispatchLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every entry in insertion order.
    pub async fn entries(&self) -> Vec<DispatchLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    fn backend_label(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, entry: DispatchLogEntry) -> Result<(), DealflowError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, DealflowError> {
        let entries = self.entries.read().await;
        // Insertion order is creation order; walk it backwards for newest first.
        let matching: Vec<&DispatchLogEntry> =
            entries.iter().rev().filter(|entry| query.matches(entry)).collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit)
            .cloned()
            .collect();
        Ok(AuditPage::new(page, query, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(contact: ContactId, sender: OwnerId) -> DispatchAttempt<'static> {
        DispatchAttempt {
            contact,
            sender,
            recipient: "ada@example.com",
            subject: "Hello",
            message: "<p>hi</p>",
        }
    }

    #[test]
    fn sent_and_failed_entries_carry_exclusive_fields() {
        let a = attempt(ContactId::generate(), OwnerId::generate());
        let sent = DispatchLogEntry::sent(&a, "mock", "msg-1");
        assert_eq!(sent.status, DispatchStatus::Sent);
        assert_eq!(sent.provider_id.as_deref(), Some("msg-1"));
        assert!(sent.error.is_none());

        let failed = DispatchLogEntry::failed(&a, "mock", "invalid address");
        assert_eq!(failed.status, DispatchStatus::Failed);
        assert!(failed.provider_id.is_none());
        assert_eq!(failed.error.as_deref(), Some("invalid address"));
    }

    #[tokio::test]
    async fn query_filters_by_sender_contact_and_status_newest_first() {
        let store = InMemoryAuditStore::new();
        let sender = OwnerId::generate();
        let other_sender = OwnerId::generate();
        let alice = ContactId::generate();
        let bob = ContactId::generate();

        store
            .append(DispatchLogEntry::sent(&attempt(alice, sender), "mock", "m1"))
            .await
            .unwrap();
        store
            .append(DispatchLogEntry::failed(&attempt(bob, sender), "mock", "boom"))
            .await
            .unwrap();
        store
            .append(DispatchLogEntry::sent(&attempt(bob, sender), "mock", "m3"))
            .await
            .unwrap();
        store
            .append(DispatchLogEntry::sent(&attempt(alice, other_sender), "mock", "m4"))
            .await
            .unwrap();

        let page = store.query(&AuditQuery::for_sender(sender)).await.unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<_> = page
            .entries
            .iter()
            .map(|e| e.provider_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["m3".to_string(), String::new(), "m1".to_string()]);

        let page = store
            .query(&AuditQuery::for_sender(sender).with_contact(bob))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .query(&AuditQuery::for_sender(sender).with_status(DispatchStatus::Failed))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn query_paginates() {
        let store = InMemoryAuditStore::new();
        let sender = OwnerId::generate();
        let contact = ContactId::generate();
        for i in 0..5 {
            store
                .append(DispatchLogEntry::sent(
                    &attempt(contact, sender),
                    "mock",
                    format!("m{i}"),
                ))
                .await
                .unwrap();
        }

        let page = store
            .query(&AuditQuery::for_sender(sender).paginate(2, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].provider_id.as_deref(), Some("m2"));

        let page = store
            .query(&AuditQuery::for_sender(sender).paginate(4, 2))
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }

    #[test]
    fn status_parsing() {
        assert_eq!("Failed".parse::<DispatchStatus>().unwrap(), DispatchStatus::Failed);
        assert!("pending".parse::<DispatchStatus>().is_err());
    }
}
