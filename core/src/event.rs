//! Typed audit events.
//!
//! RULE: Every score computation, alert transition, fraud assessment,
//! forecast, and job failure appends one of these to the audit log.
//! Services never write free-form audit rows.

use crate::types::{EntityId, EntityKind, Severity, TenantId};
use serde::{Deserialize, Serialize};

/// Every event recorded by the pipeline.
/// Variants are added as the pipeline grows — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RiskEvent {
    // ── Document pipeline ──────────────────────────────
    DocumentUploaded {
        tenant_id: TenantId,
        document_id: EntityId,
        company_id: EntityId,
        doc_type: String,
    },
    DocumentProcessed {
        tenant_id: TenantId,
        document_id: EntityId,
        parser_version: String,
        flag_count: usize,
    },
    DocumentFailed {
        tenant_id: TenantId,
        document_id: EntityId,
        error: String,
    },
    JobFailed {
        tenant_id: TenantId,
        job_id: EntityId,
        document_id: EntityId,
        attempts: u32,
        error: String,
    },

    // ── Rule engine ────────────────────────────────────
    RiskScoreComputed {
        tenant_id: TenantId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        score: f64,
        severity: Severity,
        triggered: Vec<String>,
    },

    // ── Alerting ───────────────────────────────────────
    RiskAlertRaised {
        tenant_id: TenantId,
        alert_id: EntityId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        source: String,
        score: f64,
        severity: Severity,
    },
    RiskAlertRefreshed {
        tenant_id: TenantId,
        alert_id: EntityId,
        score: f64,
        severity: Severity,
    },
    RiskAlertResolved {
        tenant_id: TenantId,
        alert_id: EntityId,
        status: String,
    },

    // ── Fraud scorer ───────────────────────────────────
    FraudAssessed {
        tenant_id: TenantId,
        company_id: EntityId,
        overall_score: f64,
        confidence: f64,
        factors: Vec<String>,
    },

    // ── Forecast ───────────────────────────────────────
    ForecastComputed {
        tenant_id: TenantId,
        company_id: EntityId,
        horizon_days: u32,
        trend: String,
        warning_count: usize,
    },
}

/// Extract a stable string name from a RiskEvent variant.
/// Used for the event_type column in audit_log.
pub fn event_type_name(event: &RiskEvent) -> &'static str {
    match event {
        RiskEvent::DocumentUploaded { .. } => "document_uploaded",
        RiskEvent::DocumentProcessed { .. } => "document_processed",
        RiskEvent::DocumentFailed { .. } => "document_failed",
        RiskEvent::JobFailed { .. } => "job_failed",
        RiskEvent::RiskScoreComputed { .. } => "risk_score_computed",
        RiskEvent::RiskAlertRaised { .. } => "risk_alert_raised",
        RiskEvent::RiskAlertRefreshed { .. } => "risk_alert_refreshed",
        RiskEvent::RiskAlertResolved { .. } => "risk_alert_resolved",
        RiskEvent::FraudAssessed { .. } => "fraud_assessed",
        RiskEvent::ForecastComputed { .. } => "forecast_computed",
    }
}

/// A persisted audit row, as read back from the store.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Option<i64>,
    pub tenant_id: TenantId,
    pub entity_id: EntityId,
    pub event_type: String,
    pub payload: String,
    pub recorded_on: String,
}
