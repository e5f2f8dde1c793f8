//! Dealflow core: the deal pipeline engine and the message dispatch engine.
//!
//! Every operation is scoped to the calling owner. Dispatch never skips the
//! audit trail: each send attempt produces exactly one append-only log entry,
//! and a bulk send isolates per-recipient failures.

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod pipeline;
pub mod stage;
pub mod storage;
pub mod templates;
pub mod transport;
pub mod types;

pub use audit::{
    AuditPage, AuditQuery, AuditStore, DispatchAttempt, DispatchLogEntry, DispatchStatus,
    InMemoryAuditStore,
};
pub use config::{DispatchConfig, OwnershipPolicy, PipelineConfig};
pub use directory::{DealRepository, RecipientDirectory};
pub use dispatch::{
    BulkDispatchReport, DispatchEngine, DispatchFailure, DispatchSuccess, SenderIdentity,
    SingleDispatch,
};
pub use error::{DealflowError, TransportError};
pub use ids::{ContactId, DealId, LogEntryId, OwnerId};
pub use pipeline::{apply_stage, push_activity, PipelineEngine, PipelineStats, StageSummary};
pub use stage::DealStage;
pub use storage::{bootstrap_audit_store, AuditStorageConfig, PostgresAuditStore};
pub use templates::{MessageTemplate, RenderedMessage};
pub use transport::{MessageTransport, OutboundMessage, TransportReceipt};
pub use types::{Activity, ActivityKind, Contact, ContactStatus, Deal, NewDeal};
