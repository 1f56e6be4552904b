//! Risk score, score-history, and alert queries.

use super::{entity_kind_from_sql, json_from_sql, severity_from_sql, RiskStore};
use crate::{
    error::RiskResult,
    types::{EntityKind, Severity},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone)]
pub struct RiskScoreRecord {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub score: f64,
    pub severity: Severity,
    pub triggered: Vec<String>,
    pub engine_version: String,
    pub scored_on: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub alert_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub source: String,
    pub score: f64,
    pub severity: Severity,
    pub status: String,
    pub opened_on: NaiveDate,
    pub updated_on: NaiveDate,
}

/// One day of averaged company score history, oldest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyScore {
    pub day: NaiveDate,
    pub score: f64,
}

fn score_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<RiskScoreRecord> {
    let triggered_raw: String = row.get(4)?;
    Ok(RiskScoreRecord {
        entity_kind: entity_kind_from_sql(row.get(0)?)?,
        entity_id: row.get(1)?,
        score: row.get(2)?,
        severity: severity_from_sql(row.get(3)?)?,
        triggered: json_from_sql(&triggered_raw)?,
        engine_version: row.get(5)?,
        scored_on: row.get(6)?,
    })
}

fn alert_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRecord> {
    Ok(AlertRecord {
        alert_id: row.get(0)?,
        entity_kind: entity_kind_from_sql(row.get(1)?)?,
        entity_id: row.get(2)?,
        source: row.get(3)?,
        score: row.get(4)?,
        severity: severity_from_sql(row.get(5)?)?,
        status: row.get(6)?,
        opened_on: row.get(7)?,
        updated_on: row.get(8)?,
    })
}

impl RiskStore {
    // ── Current scores ─────────────────────────────────────────

    /// Replace the entity's current score and append to the history.
    pub fn save_risk_score(&self, tenant: &str, score: &RiskScoreRecord) -> RiskResult<()> {
        let triggered = serde_json::to_string(&score.triggered)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO risk_score (
                tenant_id, entity_kind, entity_id, score, severity,
                triggered, engine_version, scored_on
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tenant,
                score.entity_kind.as_str(),
                score.entity_id,
                score.score,
                score.severity.as_str(),
                triggered,
                score.engine_version,
                score.scored_on,
            ],
        )?;
        self.append_score_history(tenant, score)?;
        Ok(())
    }

    /// Append-only history row. Exposed separately so backfills and
    /// tests can seed history without touching the current score.
    pub fn append_score_history(&self, tenant: &str, score: &RiskScoreRecord) -> RiskResult<()> {
        let triggered = serde_json::to_string(&score.triggered)?;
        self.conn.execute(
            "INSERT INTO risk_score_history (
                tenant_id, entity_kind, entity_id, score, severity,
                triggered, engine_version, scored_on
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tenant,
                score.entity_kind.as_str(),
                score.entity_id,
                score.score,
                score.severity.as_str(),
                triggered,
                score.engine_version,
                score.scored_on,
            ],
        )?;
        Ok(())
    }

    pub fn get_risk_score(
        &self,
        tenant: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> RiskResult<Option<RiskScoreRecord>> {
        self.conn
            .query_row(
                "SELECT entity_kind, entity_id, score, severity, triggered,
                        engine_version, scored_on
                 FROM risk_score
                 WHERE tenant_id = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                params![tenant, kind.as_str(), entity_id],
                score_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Most recent current document scores for a company, newest first.
    pub fn recent_document_scores(
        &self,
        tenant: &str,
        company_id: &str,
        limit: usize,
    ) -> RiskResult<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT rs.score
             FROM risk_score rs
             JOIN document d ON d.document_id = rs.entity_id AND d.tenant_id = rs.tenant_id
             WHERE rs.tenant_id = ?1 AND rs.entity_kind = 'document' AND d.company_id = ?2
             ORDER BY rs.scored_on DESC, rs.entity_id DESC
             LIMIT ?3",
        )?;
        let scores: Vec<f64> = stmt
            .query_map(params![tenant, company_id, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    /// Per-day average company score from the history, oldest first.
    pub fn daily_company_scores(
        &self,
        tenant: &str,
        company_id: &str,
    ) -> RiskResult<Vec<DailyScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT scored_on, AVG(score)
             FROM risk_score_history
             WHERE tenant_id = ?1 AND entity_kind = 'company' AND entity_id = ?2
             GROUP BY scored_on
             ORDER BY scored_on ASC",
        )?;
        let rows = stmt.query_map(params![tenant, company_id], |row| {
            Ok(DailyScore {
                day: row.get(0)?,
                score: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn history_count(
        &self,
        tenant: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM risk_score_history
                 WHERE tenant_id = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                params![tenant, kind.as_str(), entity_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Alerts ─────────────────────────────────────────────────

    pub fn find_open_alert(
        &self,
        tenant: &str,
        kind: EntityKind,
        entity_id: &str,
        source: &str,
    ) -> RiskResult<Option<AlertRecord>> {
        self.conn
            .query_row(
                "SELECT alert_id, entity_kind, entity_id, source, score, severity,
                        status, opened_on, updated_on
                 FROM risk_alert
                 WHERE tenant_id = ?1 AND entity_kind = ?2 AND entity_id = ?3
                   AND source = ?4 AND status = 'open'",
                params![tenant, kind.as_str(), entity_id, source],
                alert_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn insert_alert(&self, tenant: &str, alert: &AlertRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO risk_alert (
                alert_id, tenant_id, entity_kind, entity_id, source,
                score, severity, status, opened_on, updated_on
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                alert.alert_id,
                tenant,
                alert.entity_kind.as_str(),
                alert.entity_id,
                alert.source,
                alert.score,
                alert.severity.as_str(),
                alert.status,
                alert.opened_on,
                alert.updated_on,
            ],
        )?;
        Ok(())
    }

    /// Refresh an open alert in place on re-evaluation.
    pub fn refresh_alert(
        &self,
        tenant: &str,
        alert_id: &str,
        score: f64,
        severity: Severity,
        on: NaiveDate,
    ) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE risk_alert SET score = ?1, severity = ?2, updated_on = ?3
             WHERE tenant_id = ?4 AND alert_id = ?5 AND status = 'open'",
            params![score, severity.as_str(), on, tenant, alert_id],
        )?;
        Ok(())
    }

    pub fn set_alert_status(
        &self,
        tenant: &str,
        alert_id: &str,
        status: &str,
        on: NaiveDate,
    ) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE risk_alert SET status = ?1, updated_on = ?2
             WHERE tenant_id = ?3 AND alert_id = ?4",
            params![status, on, tenant, alert_id],
        )?;
        Ok(())
    }

    pub fn alerts_for_entity(
        &self,
        tenant: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> RiskResult<Vec<AlertRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT alert_id, entity_kind, entity_id, source, score, severity,
                    status, opened_on, updated_on
             FROM risk_alert
             WHERE tenant_id = ?1 AND entity_kind = ?2 AND entity_id = ?3
             ORDER BY opened_on ASC, alert_id ASC",
        )?;
        let rows = stmt.query_map(params![tenant, kind.as_str(), entity_id], alert_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn open_alert_count(&self, tenant: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM risk_alert WHERE tenant_id = ?1 AND status = 'open'",
                params![tenant],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Open alerts attached to the company itself or to any of its
    /// documents. Feeds the company-level rule aggregates.
    pub fn open_alert_count_for_company(&self, tenant: &str, company_id: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM risk_alert a
                 WHERE a.tenant_id = ?1 AND a.status = 'open' AND (
                     (a.entity_kind = 'company' AND a.entity_id = ?2)
                     OR (a.entity_kind = 'document' AND a.entity_id IN (
                         SELECT document_id FROM document
                         WHERE tenant_id = ?1 AND company_id = ?2))
                 )",
                params![tenant, company_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn alert_count(&self, tenant: &str) -> RiskResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM risk_alert WHERE tenant_id = ?1",
                params![tenant],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
