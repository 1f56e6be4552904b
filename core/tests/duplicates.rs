//! Duplicate-invoice detection and the invoice registration side
//! checks, including tenant isolation.

use chrono::NaiveDate;
use riskledger_core::{
    config::RiskConfig,
    feature_extractor::{self as feat},
    invoicing::InvoiceService,
    store::{InvoiceRecord, RiskStore},
    types::EntityKind,
};

const TENANT: &str = "tenant-a";
const OTHER_TENANT: &str = "tenant-b";
const COMPANY: &str = "co-1";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup() -> RiskStore {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    for (tenant, name) in [(TENANT, "Tenant A"), (OTHER_TENANT, "Tenant B")] {
        store.insert_tenant(tenant, name, day(2024, 1, 1)).unwrap();
        store
            .insert_company(tenant, COMPANY, "Acme Trading", None)
            .unwrap();
    }
    store
}

fn invoice(id: &str, number: &str, issue: NaiveDate, amount: f64) -> InvoiceRecord {
    InvoiceRecord {
        invoice_id: id.to_string(),
        company_id: COMPANY.to_string(),
        external_number: Some(number.to_string()),
        issue_date: issue,
        due_date: Some(issue + chrono::Duration::days(30)),
        total_amount: amount,
        counterparty: Some("Skyline Supplies".to_string()),
        source_document_id: None,
    }
}

/// Two invoices with the same number, issue date, and amount (within
/// a cent): each one reports the other as its duplicate.
#[test]
fn duplicate_pairs_are_symmetric() {
    let store = setup();
    let a = invoice("inv-a", "INV-2024-9", day(2024, 4, 1), 5000.00);
    let b = invoice("inv-b", "INV-2024-9", day(2024, 4, 1), 5000.01);
    store.insert_invoice(TENANT, &a).unwrap();
    store.insert_invoice(TENANT, &b).unwrap();

    let dups_of_a = feat::duplicate_invoices(&store, &TENANT.into(), &a).unwrap();
    let dups_of_b = feat::duplicate_invoices(&store, &TENANT.into(), &b).unwrap();

    assert_eq!(dups_of_a.len(), 1);
    assert_eq!(dups_of_a[0].invoice_id, "inv-b");
    assert_eq!(dups_of_b.len(), 1);
    assert_eq!(dups_of_b[0].invoice_id, "inv-a");
}

/// The same external number in another tenant is not a duplicate.
#[test]
fn duplicate_detection_is_tenant_scoped() {
    let store = setup();
    let a = invoice("inv-a", "INV-2024-9", day(2024, 4, 1), 5000.0);
    let other = invoice("inv-x", "INV-2024-9", day(2024, 4, 1), 5000.0);
    store.insert_invoice(TENANT, &a).unwrap();
    store.insert_invoice(OTHER_TENANT, &other).unwrap();

    let dups = feat::duplicate_invoices(&store, &TENANT.into(), &a).unwrap();
    assert!(dups.is_empty());
}

/// An invoice without an external number has nothing to collide with.
#[test]
fn numberless_invoices_have_no_duplicates() {
    let store = setup();
    let mut a = invoice("inv-a", "unused", day(2024, 4, 1), 5000.0);
    a.external_number = None;
    store.insert_invoice(TENANT, &a).unwrap();

    let dups = feat::duplicate_invoices(&store, &TENANT.into(), &a).unwrap();
    assert!(dups.is_empty());
}

/// Registering a colliding invoice succeeds and leaves one open
/// company alert, idempotent across further collisions.
#[test]
fn registration_raises_one_company_alert() {
    let store = setup();
    let service = InvoiceService::new(RiskConfig::default_test());

    service
        .register_invoice(
            &store,
            &TENANT.into(),
            &invoice("inv-1", "INV-7", day(2024, 4, 1), 900.0),
            day(2024, 4, 1),
        )
        .unwrap();
    service
        .register_invoice(
            &store,
            &TENANT.into(),
            &invoice("inv-2", "INV-7", day(2024, 4, 2), 900.0),
            day(2024, 4, 2),
        )
        .unwrap();
    service
        .register_invoice(
            &store,
            &TENANT.into(),
            &invoice("inv-3", "INV-7", day(2024, 4, 3), 900.0),
            day(2024, 4, 3),
        )
        .unwrap();

    // all three landed despite the collisions
    assert_eq!(store.invoice_count(TENANT, COMPANY).unwrap(), 3);

    let alerts = store
        .alerts_for_entity(TENANT, EntityKind::Company, COMPANY)
        .unwrap();
    let duplicate_alerts: Vec<_> = alerts
        .iter()
        .filter(|a| a.source == feat::DUPLICATE_INVOICE_NUMBER)
        .collect();
    assert_eq!(duplicate_alerts.len(), 1);
    assert_eq!(duplicate_alerts[0].status, "open");
    // refreshed by the latest collision
    assert_eq!(duplicate_alerts[0].updated_on, day(2024, 4, 3));
}
