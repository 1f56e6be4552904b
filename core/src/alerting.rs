//! Alert lifecycle.
//!
//! RULE: at most one open alert per (tenant, entity, source). A
//! re-evaluation that stays above threshold refreshes the open row
//! instead of stacking a new one; closing the alert re-arms the key.

use crate::{
    error::RiskResult,
    event::RiskEvent,
    store::{AlertRecord, RiskStore},
    types::{EntityId, EntityKind, Severity, TenantId},
};
use chrono::NaiveDate;
use uuid::Uuid;

/// Raise or refresh the open alert for (entity, source).
/// Returns the id of the row that now carries the signal.
#[allow(clippy::too_many_arguments)]
pub fn raise_alert(
    store: &RiskStore,
    tenant: &TenantId,
    kind: EntityKind,
    entity_id: &EntityId,
    source: &str,
    score: f64,
    severity: Severity,
    on: NaiveDate,
) -> RiskResult<EntityId> {
    if let Some(open) = store.find_open_alert(tenant, kind, entity_id, source)? {
        store.refresh_alert(tenant, &open.alert_id, score, severity, on)?;
        store.append_audit(
            tenant,
            entity_id,
            &RiskEvent::RiskAlertRefreshed {
                tenant_id: tenant.clone(),
                alert_id: open.alert_id.clone(),
                score,
                severity,
            },
            on,
        )?;
        log::debug!(
            "tenant={tenant} refreshed {source} alert on {} {entity_id} (score {score:.1})",
            kind.as_str()
        );
        return Ok(open.alert_id);
    }

    let alert_id = format!("alert-{}", Uuid::new_v4());
    let alert = AlertRecord {
        alert_id: alert_id.clone(),
        entity_kind: kind,
        entity_id: entity_id.clone(),
        source: source.to_string(),
        score,
        severity,
        status: "open".to_string(),
        opened_on: on,
        updated_on: on,
    };
    store.insert_alert(tenant, &alert)?;
    store.append_audit(
        tenant,
        entity_id,
        &RiskEvent::RiskAlertRaised {
            tenant_id: tenant.clone(),
            alert_id: alert_id.clone(),
            entity_kind: kind,
            entity_id: entity_id.clone(),
            source: source.to_string(),
            score,
            severity,
        },
        on,
    )?;
    log::warn!(
        "tenant={tenant} {severity} alert {source} on {} {entity_id} (score {score:.1})",
        kind.as_str()
    );
    Ok(alert_id)
}

pub fn acknowledge_alert(
    store: &RiskStore,
    tenant: &TenantId,
    alert_id: &EntityId,
    on: NaiveDate,
) -> RiskResult<()> {
    transition(store, tenant, alert_id, "acknowledged", on)
}

pub fn close_alert(
    store: &RiskStore,
    tenant: &TenantId,
    alert_id: &EntityId,
    on: NaiveDate,
) -> RiskResult<()> {
    transition(store, tenant, alert_id, "closed", on)
}

fn transition(
    store: &RiskStore,
    tenant: &TenantId,
    alert_id: &EntityId,
    status: &str,
    on: NaiveDate,
) -> RiskResult<()> {
    store.set_alert_status(tenant, alert_id, status, on)?;
    store.append_audit(
        tenant,
        alert_id,
        &RiskEvent::RiskAlertResolved {
            tenant_id: tenant.clone(),
            alert_id: alert_id.clone(),
            status: status.to_string(),
        },
        on,
    )?;
    Ok(())
}
