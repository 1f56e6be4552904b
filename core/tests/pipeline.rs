//! End-to-end pipeline tests: upload, OCR, parse, features, scoring,
//! and the job queue's retry bookkeeping.

use chrono::NaiveDate;
use riskledger_core::{
    config::RiskConfig,
    document_pipeline::DocumentPipeline,
    feature_extractor as feat,
    job_queue::JobQueue,
    ocr::PlainTextOcr,
    storage::MemoryStorage,
    store::{InvoiceRecord, RiskStore},
    types::{DocumentType, EntityKind, Severity},
};

const TENANT: &str = "tenant-a";
const COMPANY: &str = "co-1";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup() -> (RiskStore, MemoryStorage, DocumentPipeline, JobQueue) {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_tenant(TENANT, "Tenant A", day(2024, 1, 1)).unwrap();
    store
        .insert_company(TENANT, COMPANY, "Acme Trading", Some("1234567890"))
        .unwrap();

    let config = RiskConfig::default_test();
    let pipeline = DocumentPipeline::new(Box::new(PlainTextOcr), config.clone());
    let queue = JobQueue::new(&config);
    (store, MemoryStorage::new(), pipeline, queue)
}

const SUSPICIOUS_INVOICE: &str = "ACME Ltd\n\
    Invoice No: INV-77\n\
    Invoice Date: 15.03.2024\n\
    Due Date: 01.03.2024\n\
    Grand Total: 1.234,56 TRY\n";

/// Upload, drain the queue, and watch one suspicious invoice travel
/// the whole pipeline into a high-severity score with an open alert.
#[test]
fn suspicious_invoice_flows_to_an_alert() {
    let (store, storage, pipeline, queue) = setup();

    // a sibling invoice already carries the same external number
    store
        .insert_invoice(
            TENANT,
            &InvoiceRecord {
                invoice_id: "inv-1".into(),
                company_id: COMPANY.into(),
                external_number: Some("INV-77".into()),
                issue_date: day(2024, 2, 1),
                due_date: Some(day(2024, 3, 1)),
                total_amount: 1234.56,
                counterparty: Some("Skyline Supplies".into()),
                source_document_id: None,
            },
        )
        .unwrap();

    let document_id = pipeline
        .upload_document(
            &store,
            &storage,
            &TENANT.into(),
            &COMPANY.into(),
            DocumentType::Invoice,
            "2024/03/inv-77.txt",
            SUSPICIOUS_INVOICE.as_bytes(),
            day(2024, 3, 16),
        )
        .unwrap();

    let processed = queue
        .drain(&store, &storage, &pipeline, day(2024, 3, 16))
        .unwrap();
    assert_eq!(processed, 1);

    let document = store.get_document(TENANT, &document_id).unwrap().unwrap();
    assert_eq!(document.status, "processed");
    assert_eq!(document.processed_on, Some(day(2024, 3, 16)));

    let parsed = store.get_parsed_data(TENANT, &document_id).unwrap().unwrap();
    assert_eq!(parsed.invoice_number.as_deref(), Some("INV-77"));
    assert_eq!(parsed.total_amount, Some(1234.56));

    let features = store.get_risk_features(TENANT, &document_id).unwrap().unwrap();
    assert!(features.has_flag(feat::DUE_BEFORE_ISSUE));
    assert!(features.has_flag(feat::DUPLICATE_INVOICE_NUMBER));

    let score = store
        .get_risk_score(TENANT, EntityKind::Document, &document_id)
        .unwrap()
        .unwrap();
    // DUE_BEFORE_ISSUE (30) + DUPLICATE_INVOICE_NUMBER (40)
    assert_eq!(score.score, 70.0);
    assert_eq!(score.severity, Severity::High);
    assert_eq!(
        score.triggered,
        vec![
            feat::DUE_BEFORE_ISSUE.to_string(),
            feat::DUPLICATE_INVOICE_NUMBER.to_string()
        ]
    );

    let alerts = store
        .alerts_for_entity(TENANT, EntityKind::Document, &document_id)
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "open");

    let job = store.job_for_document(TENANT, &document_id).unwrap().unwrap();
    assert_eq!(job.status, "succeeded");
    assert_eq!(job.attempts, 1);

    assert!(store.audit_count(TENANT).unwrap() > 0);
}

/// Garbage bytes still process: sparse parse, structural flags, low
/// severity, no failure.
#[test]
fn unparseable_upload_still_processes() {
    let (store, storage, pipeline, queue) = setup();

    let document_id = pipeline
        .upload_document(
            &store,
            &storage,
            &TENANT.into(),
            &COMPANY.into(),
            DocumentType::Invoice,
            "2024/03/noise.bin",
            &[0x00, 0xff, 0x13, 0x37, 0x42],
            day(2024, 3, 16),
        )
        .unwrap();

    queue
        .drain(&store, &storage, &pipeline, day(2024, 3, 16))
        .unwrap();

    let document = store.get_document(TENANT, &document_id).unwrap().unwrap();
    assert_eq!(document.status, "processed");

    let features = store.get_risk_features(TENANT, &document_id).unwrap().unwrap();
    assert!(features.has_flag(feat::MISSING_INVOICE_NUMBER));
    assert!(features.has_flag(feat::MISSING_AMOUNT));

    let score = store
        .get_risk_score(TENANT, EntityKind::Document, &document_id)
        .unwrap()
        .unwrap();
    assert_eq!(score.score, 30.0);
    assert_eq!(score.severity, Severity::Low);
}

/// Re-processing replaces parsed data and features instead of stacking
/// second copies.
#[test]
fn reprocessing_replaces_parsed_rows() {
    let (store, storage, pipeline, queue) = setup();

    let document_id = pipeline
        .upload_document(
            &store,
            &storage,
            &TENANT.into(),
            &COMPANY.into(),
            DocumentType::Invoice,
            "2024/03/inv-88.txt",
            SUSPICIOUS_INVOICE.as_bytes(),
            day(2024, 3, 16),
        )
        .unwrap();
    queue
        .drain(&store, &storage, &pipeline, day(2024, 3, 16))
        .unwrap();

    pipeline
        .process_document(&store, &storage, &TENANT.into(), &document_id, day(2024, 3, 17))
        .unwrap();

    let parsed = store.get_parsed_data(TENANT, &document_id).unwrap().unwrap();
    assert_eq!(parsed.invoice_number.as_deref(), Some("INV-77"));
    let history = store
        .history_count(TENANT, EntityKind::Document, &document_id)
        .unwrap();
    assert_eq!(history, 2);
}

/// A job whose document is gone retries up to the attempt cap and is
/// parked as failed with the error recorded.
#[test]
fn broken_jobs_park_after_the_attempt_cap() {
    let (store, storage, pipeline, queue) = setup();

    store
        .insert_job(TENANT, "job-ghost", "doc-ghost", day(2024, 3, 16))
        .unwrap();

    let processed = queue
        .drain(&store, &storage, &pipeline, day(2024, 3, 16))
        .unwrap();
    // one claim per attempt
    assert_eq!(processed, 3);

    let job = store.job_for_document(TENANT, "doc-ghost").unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.as_deref().unwrap_or("").contains("not found"));
    assert_eq!(store.pending_job_count().unwrap(), 0);
}
