use crate::audit::{AuditPage, AuditQuery, AuditStore, DispatchAttempt, DispatchLogEntry};
use crate::config::DispatchConfig;
use crate::directory::RecipientDirectory;
use crate::error::{DealflowError, TransportError};
use crate::ids::{ContactId, OwnerId};
use crate::templates::MessageTemplate;
use crate::transport::{MessageTransport, OutboundMessage, TransportReceipt};
use crate::types::Contact;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const MAX_SUBJECT_CHARS: usize = 200;

/// The account a dispatch is performed for, and the address it is sent from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub owner: OwnerId,
    pub address: String,
}

impl SenderIdentity {
    pub fn new(owner: OwnerId, address: impl Into<String>) -> Self {
        Self {
            owner,
            address: address.into(),
        }
    }
}

/// Result of a successful single dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleDispatch {
    pub message_id: String,
    pub log: DispatchLogEntry,
    /// Set when the message went out but its log entry could not be stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSuccess {
    pub contact_id: ContactId,
    pub email: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub contact_id: ContactId,
    pub email: String,
    pub error: String,
}

/// Aggregated outcome of a bulk dispatch. Partial failure is a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDispatchReport {
    /// Number of recipients that resolved and were attempted.
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub successes: Vec<DispatchSuccess>,
    pub failures: Vec<DispatchFailure>,
    /// Recipients whose log entry could not be stored. Each of them is
    /// still listed in `successes` or `failures` by transport outcome.
    #[serde(default)]
    pub audit_errors: Vec<DispatchFailure>,
}

impl BulkDispatchReport {
    /// Whether every attempt in the batch reached the audit store.
    pub fn audit_complete(&self) -> bool {
        self.audit_errors.is_empty()
    }
}

/// One recipient's attempt and whether its log entry was stored.
struct RecordedAttempt {
    log: DispatchLogEntry,
    outcome: Result<TransportReceipt, TransportError>,
    audit_error: Option<DealflowError>,
}

/// Sends messages through the transport and keeps the audit trail.
///
/// Every attempt produces exactly one log entry, whether the transport
/// accepted the message, rejected it, or timed out.
pub struct DispatchEngine {
    directory: Arc<dyn RecipientDirectory>,
    transport: Arc<dyn MessageTransport>,
    audit: Arc<dyn AuditStore>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        transport: Arc<dyn MessageTransport>,
        audit: Arc<dyn AuditStore>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            transport,
            audit,
            config,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.transport.provider()
    }

    pub fn audit_backend(&self) -> &'static str {
        self.audit.backend_label()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Send one message to one owned contact.
    ///
    /// A transport failure is recorded and then returned to the caller. An
    /// audit store failure after a successful send does not hide the
    /// provider id; it is reported in `audit_error` instead.
    #[instrument(skip_all, fields(owner = %sender.owner, contact = %contact_id))]
    pub async fn dispatch_single(
        &self,
        sender: &SenderIdentity,
        contact_id: &ContactId,
        subject: &str,
        body: &str,
    ) -> Result<SingleDispatch, DealflowError> {
        validate_message(sender, subject, body)?;

        let contact = self
            .directory
            .find_owned_contact(&sender.owner, contact_id)
            .await?
            .ok_or_else(|| DealflowError::not_found("contact not found or not authorized"))?;

        let recorded = self.attempt(sender, &contact, subject, body).await;
        match recorded.outcome {
            Ok(receipt) => {
                info!(message_id = %receipt.id, provider = self.provider(), "Message sent");
                Ok(SingleDispatch {
                    message_id: receipt.id,
                    log: recorded.log,
                    audit_error: recorded.audit_error.map(|err| err.to_string()),
                })
            }
            Err(error) => {
                warn!(error = %error, provider = self.provider(), "Message dispatch failed");
                Err(DealflowError::from_transport(self.provider(), &error))
            }
        }
    }

    /// Send one message to every owned contact in `contact_ids`.
    ///
    /// Ids that do not resolve are dropped silently. Per-recipient failures
    /// end up in the report and never stop the other sends. Once a recipient
    /// resolves the report is always returned, audit store failures included.
    #[instrument(skip_all, fields(owner = %sender.owner, requested = contact_ids.len()))]
    pub async fn dispatch_bulk(
        &self,
        sender: &SenderIdentity,
        contact_ids: &[ContactId],
        subject: &str,
        body: &str,
    ) -> Result<BulkDispatchReport, DealflowError> {
        if contact_ids.is_empty() {
            return Err(DealflowError::invalid("contact ids array is required"));
        }
        validate_message(sender, subject, body)?;

        let mut seen = HashSet::with_capacity(contact_ids.len());
        let unique: Vec<ContactId> = contact_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut contacts = self
            .directory
            .find_owned_contacts(&sender.owner, &unique)
            .await?;
        let mut resolved = HashSet::with_capacity(contacts.len());
        contacts.retain(|contact| contact.owner == sender.owner && resolved.insert(contact.id));

        if contacts.is_empty() {
            return Err(DealflowError::not_found("no valid contacts found"));
        }

        let total = contacts.len();
        let pending: Vec<BoxFuture<'_, (usize, Contact, RecordedAttempt)>> = contacts
            .into_iter()
            .enumerate()
            .map(|(index, contact)| {
                async move {
                    let recorded = self.attempt(sender, &contact, subject, body).await;
                    (index, contact, recorded)
                }
                .boxed()
            })
            .collect();
        let mut attempts: Vec<_> = stream::iter(pending)
            .buffer_unordered(self.config.concurrency())
            .collect()
            .await;
        attempts.sort_by_key(|(index, _, _)| *index);

        let mut report = BulkDispatchReport {
            total,
            success_count: 0,
            failed_count: 0,
            successes: Vec::new(),
            failures: Vec::new(),
            audit_errors: Vec::new(),
        };

        for (_, contact, recorded) in attempts {
            if let Some(err) = recorded.audit_error {
                report.audit_errors.push(DispatchFailure {
                    contact_id: contact.id,
                    email: contact.email.clone(),
                    error: err.to_string(),
                });
            }

            match recorded.outcome {
                Ok(receipt) => report.successes.push(DispatchSuccess {
                    contact_id: contact.id,
                    email: contact.email.clone(),
                    message_id: receipt.id,
                }),
                Err(error) => {
                    warn!(contact = %contact.id, error = %error, "Recipient dispatch failed");
                    report.failures.push(DispatchFailure {
                        contact_id: contact.id,
                        email: contact.email.clone(),
                        error: error.message(),
                    });
                }
            }
        }

        report.success_count = report.successes.len();
        report.failed_count = report.failures.len();
        info!(
            total = report.total,
            sent = report.success_count,
            failed = report.failed_count,
            unlogged = report.audit_errors.len(),
            provider = self.provider(),
            "Bulk dispatch completed"
        );
        Ok(report)
    }

    /// Render a built-in template and send it to one contact.
    pub async fn dispatch_template(
        &self,
        sender: &SenderIdentity,
        contact_id: &ContactId,
        template: MessageTemplate,
        vars: &BTreeMap<String, String>,
    ) -> Result<SingleDispatch, DealflowError> {
        let rendered = template.render(vars)?;
        self.dispatch_single(sender, contact_id, &rendered.subject, &rendered.html)
            .await
    }

    /// Dispatch history, newest first. Page and limit are normalised against
    /// the configured bounds.
    pub async fn history(&self, mut query: AuditQuery) -> Result<AuditPage, DealflowError> {
        query.page = query.page.max(1);
        query.limit = match query.limit {
            0 => self.config.default_history_limit,
            limit => limit.min(self.config.max_history_limit),
        };
        self.audit.query(&query).await
    }

    async fn send_once(
        &self,
        message: &OutboundMessage,
    ) -> Result<TransportReceipt, TransportError> {
        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, self.transport.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Invoke the transport once and persist the resulting log entry. The
    /// transport outcome is kept even when the append fails.
    async fn attempt(
        &self,
        sender: &SenderIdentity,
        contact: &Contact,
        subject: &str,
        body: &str,
    ) -> RecordedAttempt {
        let message = OutboundMessage {
            to: contact.email.clone(),
            subject: subject.to_string(),
            html: body.to_string(),
            from: sender.address.clone(),
            reply_to: sender.address.clone(),
        };
        let outcome = self.send_once(&message).await;

        let attempt = DispatchAttempt {
            contact: contact.id,
            sender: sender.owner,
            recipient: &contact.email,
            subject,
            message: body,
        };
        let log = match &outcome {
            Ok(receipt) => DispatchLogEntry::sent(&attempt, self.provider(), receipt.id.clone()),
            Err(error) => DispatchLogEntry::failed(&attempt, self.provider(), error.message()),
        };
        let audit_error = match self.audit.append(log.clone()).await {
            Ok(()) => None,
            Err(err) => {
                warn!(contact = %contact.id, error = %err, "Dispatch attempt was not recorded");
                Some(err)
            }
        };

        RecordedAttempt {
            log,
            outcome,
            audit_error,
        }
    }
}

fn validate_message(
    sender: &SenderIdentity,
    subject: &str,
    body: &str,
) -> Result<(), DealflowError> {
    if sender.address.trim().is_empty() {
        return Err(DealflowError::invalid("sender address is required"));
    }
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(DealflowError::invalid("subject is required"));
    }
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(DealflowError::invalid(
            "subject must not exceed 200 characters",
        ));
    }
    if body.trim().is_empty() {
        return Err(DealflowError::invalid("message is required"));
    }
    Ok(())
}
