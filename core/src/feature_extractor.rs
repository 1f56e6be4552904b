//! Risk feature extraction.
//!
//! RULE: flags are independent and absence-tolerant. A flag whose
//! inputs are missing is simply not evaluated — extraction never fails
//! on a sparse parse.

use crate::{
    error::RiskResult,
    parser::ParsedFields,
    store::{InvoiceRecord, RiskStore},
    types::{EntityId, TenantId},
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Flag codes ───────────────────────────────────────────────────────────────

pub const DUE_BEFORE_ISSUE: &str = "DUE_BEFORE_ISSUE";
pub const DUPLICATE_INVOICE_NUMBER: &str = "DUPLICATE_INVOICE_NUMBER";
pub const MISSING_INVOICE_NUMBER: &str = "MISSING_INVOICE_NUMBER";
pub const MISSING_AMOUNT: &str = "MISSING_AMOUNT";
pub const ROUND_AMOUNT: &str = "ROUND_AMOUNT";
pub const WEEKEND_ISSUED: &str = "WEEKEND_ISSUED";
pub const LONG_PAYMENT_TERM: &str = "LONG_PAYMENT_TERM";

// ── Numeric feature names ────────────────────────────────────────────────────

pub const TOTAL_AMOUNT: &str = "total_amount";
pub const PAYMENT_TERM_DAYS: &str = "payment_term_days";
pub const FIELD_COUNT: &str = "field_count";

// Company-level aggregates fed to company-scoped rules.
pub const DOCUMENT_COUNT: &str = "document_count";
pub const MEAN_DOCUMENT_SCORE: &str = "mean_document_score";
pub const MAX_DOCUMENT_SCORE: &str = "max_document_score";
pub const OPEN_ALERT_COUNT: &str = "open_alert_count";

/// Payment terms beyond this many days are flagged.
const LONG_TERM_DAYS: i64 = 180;

/// Named signals derived from one entity: boolean flags plus numeric
/// features. Flags are kept sorted so persisted sets compare stably.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub flags: Vec<String>,
    pub numerics: BTreeMap<String, f64>,
}

impl FeatureSet {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.numerics.get(name).copied()
    }

    pub fn set_flag(&mut self, flag: &str) {
        if !self.has_flag(flag) {
            self.flags.push(flag.to_string());
            self.flags.sort();
        }
    }

    pub fn set_numeric(&mut self, name: &str, value: f64) {
        self.numerics.insert(name.to_string(), value);
    }
}

/// Pure flag evaluation given parsed fields and the number of sibling
/// invoices in the tenant sharing the external number.
pub fn evaluate(parsed: &ParsedFields, duplicate_count: i64) -> FeatureSet {
    let mut features = FeatureSet::default();

    if let (Some(issue), Some(due)) = (parsed.issue_date, parsed.due_date) {
        if due < issue {
            features.set_flag(DUE_BEFORE_ISSUE);
        } else {
            let term_days = (due - issue).num_days();
            features.set_numeric(PAYMENT_TERM_DAYS, term_days as f64);
            if term_days > LONG_TERM_DAYS {
                features.set_flag(LONG_PAYMENT_TERM);
            }
        }
    }

    match &parsed.invoice_number {
        Some(_) if duplicate_count >= 1 => features.set_flag(DUPLICATE_INVOICE_NUMBER),
        Some(_) => {}
        None => features.set_flag(MISSING_INVOICE_NUMBER),
    }

    match parsed.total_amount {
        Some(total) => {
            features.set_numeric(TOTAL_AMOUNT, total);
            if total > 0.0 && is_round_hundred(total) {
                features.set_flag(ROUND_AMOUNT);
            }
        }
        None => features.set_flag(MISSING_AMOUNT),
    }

    if let Some(issue) = parsed.issue_date {
        if matches!(issue.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            features.set_flag(WEEKEND_ISSUED);
        }
    }

    features.set_numeric(FIELD_COUNT, parsed.field_count() as f64);
    features
}

fn is_round_hundred(amount: f64) -> bool {
    let rem = amount % 100.0;
    rem.abs() < 0.005 || (100.0 - rem).abs() < 0.005
}

/// Store-aware extraction for one document: looks up sibling invoices
/// in the same tenant for duplicate detection. Invoices registered
/// from this very document do not count as their own duplicates.
pub fn extract_for_document(
    store: &RiskStore,
    tenant: &TenantId,
    document_id: &EntityId,
    parsed: &ParsedFields,
) -> RiskResult<FeatureSet> {
    let duplicate_count = match &parsed.invoice_number {
        Some(number) => {
            store.count_invoices_with_number_excluding_document(tenant, number, document_id)?
        }
        None => 0,
    };
    Ok(evaluate(parsed, duplicate_count))
}

/// Other invoices in the tenant sharing this invoice's external number.
/// Symmetric by construction: each member of a duplicate pair sees the
/// other. Used by the invoice-registration side check.
pub fn duplicate_invoices(
    store: &RiskStore,
    tenant: &TenantId,
    invoice: &InvoiceRecord,
) -> RiskResult<Vec<InvoiceRecord>> {
    match &invoice.external_number {
        Some(number) => store.invoices_with_number(tenant, number, Some(&invoice.invoice_id)),
        None => Ok(Vec::new()),
    }
}
