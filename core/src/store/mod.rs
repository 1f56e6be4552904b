//! SQLite persistence layer.
//!
//! RULE: Only the store modules talk to the database.
//! Services call store methods — they never execute SQL directly.
//! Every query is tenant-scoped; nothing here joins across tenants.

mod document;
mod ledger;
mod scoring;

pub use document::{DocumentRecord, JobRecord};
pub use ledger::{InvoiceRecord, TransactionRecord};
pub use scoring::{AlertRecord, DailyScore, RiskScoreRecord};

use crate::{
    error::RiskResult,
    event::{event_type_name, AuditEntry, RiskEvent},
    types::{DocumentType, EntityKind, Severity},
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

pub struct RiskStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl RiskStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new isolated database.
    pub fn reopen(&self) -> RiskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_documents.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_scoring.sql"))?;
        Ok(())
    }

    // ── Tenant ─────────────────────────────────────────────────

    pub fn insert_tenant(&self, tenant_id: &str, name: &str, created_on: NaiveDate) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO tenant (tenant_id, name, created_on) VALUES (?1, ?2, ?3)",
            params![tenant_id, name, created_on],
        )?;
        Ok(())
    }

    // ── Client company ─────────────────────────────────────────

    pub fn insert_company(
        &self,
        tenant: &str,
        company_id: &str,
        name: &str,
        tax_id: Option<&str>,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO client_company (company_id, tenant_id, name, tax_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![company_id, tenant, name, tax_id],
        )?;
        Ok(())
    }

    pub fn get_company(&self, tenant: &str, company_id: &str) -> RiskResult<Option<CompanyRecord>> {
        self.conn
            .query_row(
                "SELECT company_id, name, tax_id FROM client_company
                 WHERE tenant_id = ?1 AND company_id = ?2",
                params![tenant, company_id],
                |row| {
                    Ok(CompanyRecord {
                        company_id: row.get(0)?,
                        name: row.get(1)?,
                        tax_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn company_count(&self, tenant: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM client_company WHERE tenant_id = ?1",
                params![tenant],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_audit(
        &self,
        tenant: &str,
        entity_id: &str,
        event: &RiskEvent,
        on: NaiveDate,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (tenant_id, entity_id, event_type, payload, recorded_on)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tenant,
                entity_id,
                event_type_name(event),
                serde_json::to_string(event)?,
                on,
            ],
        )?;
        Ok(())
    }

    pub fn audit_count(&self, tenant: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM audit_log WHERE tenant_id = ?1",
                params![tenant],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn audit_entries_for_entity(
        &self,
        tenant: &str,
        entity_id: &str,
    ) -> RiskResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, entity_id, event_type, payload, recorded_on
             FROM audit_log WHERE tenant_id = ?1 AND entity_id = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![tenant, entity_id], |row| {
                Ok(AuditEntry {
                    id: Some(row.get(0)?),
                    tenant_id: row.get(1)?,
                    entity_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                    recorded_on: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[derive(Debug, Clone)]
pub struct CompanyRecord {
    pub company_id: String,
    pub name: String,
    pub tax_id: Option<String>,
}

// ── Column decoding helpers ────────────────────────────────────

fn bad_column(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid {what}: '{value}'").into(),
    )
}

pub(crate) fn severity_from_sql(raw: String) -> rusqlite::Result<Severity> {
    Severity::parse(&raw).ok_or_else(|| bad_column("severity", &raw))
}

pub(crate) fn entity_kind_from_sql(raw: String) -> rusqlite::Result<EntityKind> {
    EntityKind::parse(&raw).ok_or_else(|| bad_column("entity kind", &raw))
}

pub(crate) fn doc_type_from_sql(raw: String) -> rusqlite::Result<DocumentType> {
    DocumentType::parse(&raw).ok_or_else(|| bad_column("document type", &raw))
}

pub(crate) fn json_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
