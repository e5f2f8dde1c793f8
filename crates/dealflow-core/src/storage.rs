use crate::audit::{
    AuditPage, AuditQuery, AuditStore, DispatchLogEntry, DispatchStatus, InMemoryAuditStore,
};
use crate::error::DealflowError;
use crate::ids::{ContactId, LogEntryId, OwnerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Audit log persistence backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuditStorageConfig {
    /// Keep dispatch log entries in process memory only.
    #[default]
    Memory,
    /// Persist dispatch log entries in PostgreSQL.
    Postgres {
        database_url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl AuditStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Build the audit store selected by `config`, creating the schema if needed.
pub async fn bootstrap_audit_store(
    config: &AuditStorageConfig,
) -> Result<Arc<dyn AuditStore>, DealflowError> {
    let store: Arc<dyn AuditStore> = match config {
        AuditStorageConfig::Memory => Arc::new(InMemoryAuditStore::new()),
        AuditStorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresAuditStore::connect(database_url, *max_connections).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };
    info!(backend = store.backend_label(), "Audit store ready");
    Ok(store)
}

/// Append-only dispatch log in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DealflowError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| DealflowError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), DealflowError> {
        // `seq` breaks ties between entries created within the same instant.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dealflow_dispatch_log (
                seq BIGSERIAL PRIMARY KEY,
                entry_id UUID NOT NULL UNIQUE,
                contact_id UUID NOT NULL,
                sender_id UUID NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                provider TEXT NOT NULL,
                provider_id TEXT NULL,
                error TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DealflowError::Storage(format!("postgres schema create failed: {e}")))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_dealflow_dispatch_log_sender ON dealflow_dispatch_log (sender_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_dealflow_dispatch_log_contact ON dealflow_dispatch_log (contact_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_dealflow_dispatch_log_status ON dealflow_dispatch_log (status)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DealflowError::Storage(format!("postgres index create failed: {e}")))?;
        }

        Ok(())
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    fn backend_label(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, entry: DispatchLogEntry) -> Result<(), DealflowError> {
        sqlx::query(
            r#"
            INSERT INTO dealflow_dispatch_log (
                entry_id,
                contact_id,
                sender_id,
                recipient,
                subject,
                message,
                status,
                provider,
                provider_id,
                error,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.contact.as_uuid())
        .bind(*entry.sender.as_uuid())
        .bind(&entry.recipient)
        .bind(&entry.subject)
        .bind(&entry.message)
        .bind(entry.status.name())
        .bind(&entry.provider)
        .bind(&entry.provider_id)
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DealflowError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, DealflowError> {
        let contact = query.contact.map(|c| *c.as_uuid());
        let status = query.status.map(DispatchStatus::name);
        let limit = i64::try_from(query.limit)
            .map_err(|_| DealflowError::invalid("limit out of range"))?;
        let offset = i64::try_from(query.offset())
            .map_err(|_| DealflowError::invalid("page out of range"))?;

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM dealflow_dispatch_log
            WHERE sender_id = $1
              AND ($2::uuid IS NULL OR contact_id = $2)
              AND ($3::text IS NULL OR status = $3)
            "#,
        )
        .bind(*query.sender.as_uuid())
        .bind(contact)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| DealflowError::Storage(format!("postgres count failed: {e}")))?;

        let rows = sqlx::query(
            r#"
            SELECT
                entry_id,
                contact_id,
                sender_id,
                recipient,
                subject,
                message,
                status,
                provider,
                provider_id,
                error,
                created_at
            FROM dealflow_dispatch_log
            WHERE sender_id = $1
              AND ($2::uuid IS NULL OR contact_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC, seq DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(*query.sender.as_uuid())
        .bind(contact)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DealflowError::Storage(format!("postgres load failed: {e}")))?;

        let entries = rows
            .iter()
            .map(decode_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let total = usize::try_from(total)
            .map_err(|_| DealflowError::Storage("negative row count".to_string()))?;

        Ok(AuditPage::new(entries, query, total))
    }
}

fn decode_entry(row: &PgRow) -> Result<DispatchLogEntry, DealflowError> {
    let decode = |column: &str, e: sqlx::Error| {
        DealflowError::Storage(format!("postgres decode {column} failed: {e}"))
    };

    let status: String = row.try_get("status").map_err(|e| decode("status", e))?;
    let entry_id: Uuid = row.try_get("entry_id").map_err(|e| decode("entry_id", e))?;
    let contact_id: Uuid = row.try_get("contact_id").map_err(|e| decode("contact_id", e))?;
    let sender_id: Uuid = row.try_get("sender_id").map_err(|e| decode("sender_id", e))?;

    Ok(DispatchLogEntry {
        id: LogEntryId::from_uuid(entry_id),
        contact: ContactId::from_uuid(contact_id),
        sender: OwnerId::from_uuid(sender_id),
        recipient: row.try_get("recipient").map_err(|e| decode("recipient", e))?,
        subject: row.try_get("subject").map_err(|e| decode("subject", e))?,
        message: row.try_get("message").map_err(|e| decode("message", e))?,
        status: status
            .parse()
            .map_err(|_| DealflowError::Storage(format!("unknown status '{status}' in postgres")))?,
        provider: row.try_get("provider").map_err(|e| decode("provider", e))?,
        provider_id: row
            .try_get("provider_id")
            .map_err(|e| decode("provider_id", e))?,
        error: row.try_get("error").map_err(|e| decode("error", e))?,
        created_at: row.try_get("created_at").map_err(|e| decode("created_at", e))?,
    })
}
