//! Fraud scorer integration tests: degenerate inputs, confidence
//! saturation, the round-invoice scenario, and alerting.

use chrono::{NaiveDate, NaiveTime};
use riskledger_core::{
    config::RiskConfig,
    error::RiskError,
    fraud_scorer::{FraudScorer, FRAUD_ALERT_SOURCE},
    store::{InvoiceRecord, RiskStore, TransactionRecord},
    types::EntityKind,
};

const TENANT: &str = "tenant-a";
const COMPANY: &str = "co-1";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup() -> RiskStore {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_tenant(TENANT, "Tenant A", day(2024, 1, 1)).unwrap();
    store
        .insert_company(TENANT, COMPANY, "Acme Trading", None)
        .unwrap();
    store
}

fn insert_txn(store: &RiskStore, id: u32, date: NaiveDate, hour: u32, amount: f64) {
    store
        .insert_transaction(
            TENANT,
            &TransactionRecord {
                txn_id: format!("t-{id:05}"),
                company_id: COMPANY.to_string(),
                posted_at: date.and_hms_opt(hour, 30, 0).unwrap(),
                amount,
                direction: "debit".to_string(),
                counterparty: Some(format!("vendor-{}", id % 7)),
                category: Some("purchase".to_string()),
            },
        )
        .unwrap();
}

fn insert_invoice(store: &RiskStore, id: u32, date: NaiveDate, amount: f64) {
    store
        .insert_invoice(
            TENANT,
            &InvoiceRecord {
                invoice_id: format!("inv-{id:05}"),
                company_id: COMPANY.to_string(),
                external_number: Some(format!("EXT-{id:05}")),
                issue_date: date,
                due_date: Some(date + chrono::Duration::days(30)),
                total_amount: amount,
                counterparty: None,
                source_document_id: None,
            },
        )
        .unwrap();
}

/// Spread business-hours transactions across the year, with varied
/// amounts so no pattern detector has anything to say.
fn seed_unremarkable_txns(store: &RiskStore, count: u32) {
    for i in 0..count {
        let date = day(2024, 1 + (i % 12), 2 + (i % 20));
        let hour = 9 + (i % 8);
        let amount = 120.0 + 37.0 * (i % 11) as f64;
        insert_txn(store, i, date, hour, amount);
    }
}

/// A company with no transactions and no invoices yields the
/// degenerate zero assessment.
#[test]
fn empty_window_scores_zero_with_zero_confidence() {
    let store = setup();
    let scorer = FraudScorer::new(RiskConfig::default_test());

    let assessment = scorer
        .score_company(&store, &TENANT.into(), &COMPANY.into(), 365, day(2024, 12, 31))
        .unwrap();
    assert_eq!(assessment.overall_score, 0.0);
    assert_eq!(assessment.confidence, 0.0);
    assert!(assessment.factors.is_empty());
    assert_eq!(assessment.record_count, 0);
}

/// Confidence grows weakly with record count and saturates at 100.
#[test]
fn confidence_saturates_at_one_hundred_records() {
    let counts = [20u32, 60, 150];
    let mut last_confidence = 0.0;
    for count in counts {
        let store = setup();
        seed_unremarkable_txns(&store, count);
        let scorer = FraudScorer::new(RiskConfig::default_test());
        let assessment = scorer
            .score_company(&store, &TENANT.into(), &COMPANY.into(), 365, day(2024, 12, 31))
            .unwrap();
        assert!(
            assessment.confidence >= last_confidence,
            "confidence shrank at {count} records"
        );
        assert!(assessment.confidence <= 1.0);
        last_confidence = assessment.confidence;
    }
    assert_eq!(last_confidence, 1.0);
}

/// Scores always land in [0,100], whatever the data looks like.
#[test]
fn overall_score_stays_in_range() {
    let store = setup();
    seed_unremarkable_txns(&store, 40);
    // pile on every anomaly at once
    for i in 0..30 {
        insert_txn(&store, 1000 + i, day(2024, 6, 1 + (i % 3)), 2, 9_999.0);
    }
    let scorer = FraudScorer::new(RiskConfig::default_test());
    let assessment = scorer
        .score_company(&store, &TENANT.into(), &COMPANY.into(), 365, day(2024, 12, 31))
        .unwrap();
    assert!((0.0..=100.0).contains(&assessment.overall_score));
    assert!((0.0..=1.0).contains(&assessment.confidence));
}

/// Twenty invoices for exactly 10000, dated at month-end: the amount
/// cluster and the timing pattern both fire and push the score past
/// the medium threshold.
#[test]
fn round_month_end_invoices_cross_the_medium_threshold() {
    let store = setup();
    let month_ends = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for i in 0..20u32 {
        let month = 1 + (i % 12);
        let last_day = month_ends[(month - 1) as usize];
        insert_invoice(&store, i, day(2024, month, last_day), 10_000.0);
    }

    let config = RiskConfig::default_test();
    let scorer = FraudScorer::new(config.clone());
    let assessment = scorer
        .score_company(&store, &TENANT.into(), &COMPANY.into(), 365, day(2024, 12, 31))
        .unwrap();

    let names: Vec<&str> = assessment.factors.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"amount_clustering"), "factors: {names:?}");
    assert!(names.contains(&"timing_anomaly"), "factors: {names:?}");
    assert!(
        assessment.overall_score >= config.thresholds.medium,
        "score {} below the medium threshold",
        assessment.overall_score
    );
    assert_eq!(assessment.confidence, 0.2);
}

/// check_and_alert raises a company alert once the score crosses the
/// alert threshold, and keeps it idempotent across re-checks.
#[test]
fn check_and_alert_raises_one_company_alert() {
    let store = setup();
    let month_ends = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for i in 0..20u32 {
        let month = 1 + (i % 12);
        let last_day = month_ends[(month - 1) as usize];
        insert_invoice(&store, i, day(2024, month, last_day), 10_000.0);
    }

    let scorer = FraudScorer::new(RiskConfig::default_test());
    for _ in 0..2 {
        scorer
            .check_and_alert(&store, &TENANT.into(), &COMPANY.into(), day(2024, 12, 31))
            .unwrap();
    }

    let alerts = store
        .alerts_for_entity(TENANT, EntityKind::Company, COMPANY)
        .unwrap();
    let fraud_alerts: Vec<_> = alerts
        .iter()
        .filter(|a| a.source == FRAUD_ALERT_SOURCE)
        .collect();
    assert_eq!(fraud_alerts.len(), 1);
    assert_eq!(fraud_alerts[0].status, "open");
}

/// Quiet books stay below the alert threshold.
#[test]
fn unremarkable_activity_raises_no_alert() {
    let store = setup();
    seed_unremarkable_txns(&store, 50);
    let scorer = FraudScorer::new(RiskConfig::default_test());
    scorer
        .check_and_alert(&store, &TENANT.into(), &COMPANY.into(), day(2024, 12, 31))
        .unwrap();

    let alerts = store
        .alerts_for_entity(TENANT, EntityKind::Company, COMPANY)
        .unwrap();
    assert!(alerts.iter().all(|a| a.source != FRAUD_ALERT_SOURCE));
}

/// A company outside the tenant aborts with not-found.
#[test]
fn unknown_company_is_not_found() {
    let store = setup();
    let scorer = FraudScorer::new(RiskConfig::default_test());
    let err = scorer
        .score_company(&store, &TENANT.into(), &"ghost".into(), 365, day(2024, 12, 31))
        .unwrap_err();
    assert!(matches!(err, RiskError::NotFound { .. }));
}

/// Transactions pinned to a sensible time-of-day still parse back out
/// of the store with their timestamps intact.
#[test]
fn transaction_timestamps_round_trip() {
    let store = setup();
    insert_txn(&store, 1, day(2024, 5, 10), 14, 250.0);
    let txns = store
        .transactions_in_window(
            TENANT,
            COMPANY,
            day(2024, 5, 1).and_time(NaiveTime::MIN),
            day(2024, 6, 1).and_time(NaiveTime::MIN),
        )
        .unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(
        txns[0].posted_at,
        day(2024, 5, 10).and_hms_opt(14, 30, 0).unwrap()
    );
}
