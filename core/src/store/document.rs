//! Document, parsed-data, risk-feature, and processing-job queries.

use super::{doc_type_from_sql, json_from_sql, RiskStore};
use crate::{
    error::RiskResult, feature_extractor::FeatureSet, parser::ParsedFields,
    types::DocumentType,
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub company_id: String,
    pub doc_type: DocumentType,
    pub storage_path: String,
    pub status: String,
    pub uploaded_on: NaiveDate,
    pub processed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub status: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

fn document_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        document_id: row.get(0)?,
        company_id: row.get(1)?,
        doc_type: doc_type_from_sql(row.get(2)?)?,
        storage_path: row.get(3)?,
        status: row.get(4)?,
        uploaded_on: row.get(5)?,
        processed_on: row.get(6)?,
    })
}

impl RiskStore {
    // ── Document ───────────────────────────────────────────────

    pub fn insert_document(&self, tenant: &str, d: &DocumentRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO document (
                document_id, tenant_id, company_id, doc_type, storage_path,
                status, uploaded_on, processed_on
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                d.document_id,
                tenant,
                d.company_id,
                d.doc_type.as_str(),
                d.storage_path,
                d.status,
                d.uploaded_on,
                d.processed_on,
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, tenant: &str, document_id: &str) -> RiskResult<Option<DocumentRecord>> {
        self.conn
            .query_row(
                "SELECT document_id, company_id, doc_type, storage_path,
                        status, uploaded_on, processed_on
                 FROM document WHERE tenant_id = ?1 AND document_id = ?2",
                params![tenant, document_id],
                document_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn update_document_status(
        &self,
        tenant: &str,
        document_id: &str,
        status: &str,
        processed_on: Option<NaiveDate>,
    ) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE document SET status = ?1, processed_on = COALESCE(?2, processed_on)
             WHERE tenant_id = ?3 AND document_id = ?4",
            params![status, processed_on, tenant, document_id],
        )?;
        Ok(())
    }

    pub fn documents_for_company(
        &self,
        tenant: &str,
        company_id: &str,
    ) -> RiskResult<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, company_id, doc_type, storage_path,
                    status, uploaded_on, processed_on
             FROM document WHERE tenant_id = ?1 AND company_id = ?2
             ORDER BY uploaded_on ASC, document_id ASC",
        )?;
        let rows = stmt.query_map(params![tenant, company_id], document_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn document_count_by_status(&self, tenant: &str, status: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM document WHERE tenant_id = ?1 AND status = ?2",
                params![tenant, status],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Parsed data (one-to-one, replaced on re-processing) ────

    pub fn save_parsed_data(
        &self,
        tenant: &str,
        document_id: &str,
        parsed: &ParsedFields,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO parsed_data (document_id, tenant_id, parser_version, fields)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                document_id,
                tenant,
                parsed.parser_version,
                serde_json::to_string(parsed)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_parsed_data(&self, tenant: &str, document_id: &str) -> RiskResult<Option<ParsedFields>> {
        self.conn
            .query_row(
                "SELECT fields FROM parsed_data WHERE tenant_id = ?1 AND document_id = ?2",
                params![tenant, document_id],
                |row| {
                    let raw: String = row.get(0)?;
                    json_from_sql(&raw)
                },
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Risk features (one-to-one, replaced on re-processing) ──

    pub fn save_risk_features(
        &self,
        tenant: &str,
        document_id: &str,
        features: &FeatureSet,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO risk_features (document_id, tenant_id, features)
             VALUES (?1, ?2, ?3)",
            params![document_id, tenant, serde_json::to_string(features)?],
        )?;
        Ok(())
    }

    pub fn get_risk_features(&self, tenant: &str, document_id: &str) -> RiskResult<Option<FeatureSet>> {
        self.conn
            .query_row(
                "SELECT features FROM risk_features WHERE tenant_id = ?1 AND document_id = ?2",
                params![tenant, document_id],
                |row| {
                    let raw: String = row.get(0)?;
                    json_from_sql(&raw)
                },
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Processing jobs (poll-and-process) ─────────────────────

    pub fn insert_job(
        &self,
        tenant: &str,
        job_id: &str,
        document_id: &str,
        created_on: NaiveDate,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO processing_job (job_id, tenant_id, document_id, status, attempts, created_on)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
            params![job_id, tenant, document_id, created_on],
        )?;
        Ok(())
    }

    /// Claim the oldest pending job: mark it processing and bump the
    /// attempt counter. Returns None when the queue is drained.
    pub fn claim_next_job(&self) -> RiskResult<Option<JobRecord>> {
        let claimed = self
            .conn
            .query_row(
                "SELECT job_id, tenant_id, document_id, attempts, last_error
                 FROM processing_job WHERE status = 'pending'
                 ORDER BY created_on ASC, job_id ASC LIMIT 1",
                [],
                |row| {
                    Ok(JobRecord {
                        job_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        document_id: row.get(2)?,
                        status: "processing".to_string(),
                        attempts: row.get::<_, i64>(3)? as u32 + 1,
                        last_error: row.get(4)?,
                    })
                },
            )
            .optional()?;

        if let Some(job) = &claimed {
            self.conn.execute(
                "UPDATE processing_job
                 SET status = 'processing', attempts = attempts + 1
                 WHERE job_id = ?1",
                params![job.job_id],
            )?;
        }
        Ok(claimed)
    }

    pub fn mark_job(&self, job_id: &str, status: &str, error: Option<&str>) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE processing_job SET status = ?1, last_error = ?2 WHERE job_id = ?3",
            params![status, error, job_id],
        )?;
        Ok(())
    }

    pub fn job_for_document(&self, tenant: &str, document_id: &str) -> RiskResult<Option<JobRecord>> {
        self.conn
            .query_row(
                "SELECT job_id, tenant_id, document_id, status, attempts, last_error
                 FROM processing_job WHERE tenant_id = ?1 AND document_id = ?2
                 ORDER BY created_on DESC, job_id DESC LIMIT 1",
                params![tenant, document_id],
                |row| {
                    Ok(JobRecord {
                        job_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        document_id: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get::<_, i64>(4)? as u32,
                        last_error: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn pending_job_count(&self) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM processing_job WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
