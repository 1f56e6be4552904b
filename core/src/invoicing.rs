//! Invoice registration with risk side checks.
//!
//! RULE: risk side-effects never fail the primary operation. A failing
//! duplicate check is logged and the invoice still lands.

use crate::{
    config::RiskConfig,
    error::{RiskError, RiskResult},
    feature_extractor as feat,
    store::{InvoiceRecord, RiskStore},
    types::{EntityKind, Severity, TenantId},
};
use chrono::NaiveDate;

pub struct InvoiceService {
    config: RiskConfig,
}

impl InvoiceService {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Register an invoice, then run the duplicate side check against
    /// the tenant's other invoices.
    pub fn register_invoice(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        invoice: &InvoiceRecord,
        as_of: NaiveDate,
    ) -> RiskResult<()> {
        if store.get_company(tenant, &invoice.company_id)?.is_none() {
            return Err(RiskError::not_found("company", tenant, &invoice.company_id));
        }

        store.insert_invoice(tenant, invoice)?;

        if let Err(e) = self.duplicate_side_check(store, tenant, invoice, as_of) {
            log::warn!(
                "tenant={tenant} duplicate check failed for invoice {}: {e}",
                invoice.invoice_id
            );
        }
        Ok(())
    }

    fn duplicate_side_check(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        invoice: &InvoiceRecord,
        as_of: NaiveDate,
    ) -> RiskResult<()> {
        let duplicates = feat::duplicate_invoices(store, tenant, invoice)?;
        if duplicates.is_empty() {
            return Ok(());
        }

        let rule = self.config.rule(feat::DUPLICATE_INVOICE_NUMBER);
        let severity = rule.map(|r| r.severity).unwrap_or(Severity::High);
        let score = rule.map(|r| r.weight).unwrap_or(40.0);

        log::warn!(
            "tenant={tenant} invoice {} shares number {:?} with {} sibling(s)",
            invoice.invoice_id,
            invoice.external_number,
            duplicates.len()
        );

        crate::alerting::raise_alert(
            store,
            tenant,
            EntityKind::Company,
            &invoice.company_id,
            feat::DUPLICATE_INVOICE_NUMBER,
            score,
            severity,
            as_of,
        )?;
        Ok(())
    }
}
