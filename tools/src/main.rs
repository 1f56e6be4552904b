//! risk-runner: headless demo driver for the riskledger scoring core.
//!
//! Seeds a synthetic tenant deterministically from a seed, pushes a
//! batch of documents through the pipeline, and prints the resulting
//! scores, fraud assessment, and forecast.
//!
//! Usage:
//!   risk-runner --seed 12345 --db run.db --data-dir ./data

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use riskledger_core::{
    config::RiskConfig,
    document_pipeline::DocumentPipeline,
    forecast::RiskForecaster,
    fraud_scorer::FraudScorer,
    invoicing::InvoiceService,
    job_queue::JobQueue,
    ocr::PlainTextOcr,
    rule_engine::RuleEngine,
    storage::MemoryStorage,
    store::{InvoiceRecord, RiskStore, TransactionRecord},
    types::{DocumentType, EntityKind},
};
use std::env;

const TENANT: &str = "demo";
const CLEAN_COMPANY: &str = "co-retail";
const SHELL_COMPANY: &str = "co-shell";

/// Month-end days of 2024.
const MONTH_ENDS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");
    let json_output = args.iter().any(|a| a == "--json");

    println!("riskledger — risk-runner");
    println!("  seed:      {seed}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let config = RiskConfig::load(data_dir)?;
    let store = if db == ":memory:" {
        RiskStore::in_memory()?
    } else {
        RiskStore::open(db)?
    };
    store.migrate()?;

    let as_of = date(2024, 12, 31);
    seed_tenant(&store, &config, seed)?;

    // Push the generated documents through the pipeline.
    let storage = MemoryStorage::new();
    let pipeline = DocumentPipeline::new(Box::new(PlainTextOcr), config.clone());
    let queue = JobQueue::new(&config);
    upload_documents(&store, &storage, &pipeline, seed)?;
    let processed = queue.drain(&store, &storage, &pipeline, as_of)?;
    log::info!("queue drained after {processed} job runs");

    // Company scores over a trailing stretch so the forecast has
    // per-day history to fit.
    let engine = RuleEngine::new(config.clone());
    for offset in (0..14).rev() {
        let on = as_of - Duration::days(offset);
        for company in [CLEAN_COMPANY, SHELL_COMPANY] {
            engine.evaluate_company(&store, &TENANT.into(), &company.into(), on)?;
        }
    }

    let scorer = FraudScorer::new(config.clone());
    let clean_fraud = scorer.check_and_alert(&store, &TENANT.into(), &CLEAN_COMPANY.into(), as_of)?;
    let shell_fraud = scorer.check_and_alert(&store, &TENANT.into(), &SHELL_COMPANY.into(), as_of)?;

    let forecaster = RiskForecaster::new(config);
    let forecast = forecaster.forecast_company(&store, &TENANT.into(), &SHELL_COMPANY.into(), 14, as_of)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&shell_fraud)?);
        println!("{}", serde_json::to_string_pretty(&forecast)?);
        return Ok(());
    }

    // ── Summary ────────────────────────────────────────────────
    println!("documents processed: {processed}");
    println!(
        "  processed={} failed={}",
        store.document_count_by_status(TENANT, "processed")?,
        store.document_count_by_status(TENANT, "failed")?,
    );
    println!();

    for company in [CLEAN_COMPANY, SHELL_COMPANY] {
        if let Some(score) = store.get_risk_score(TENANT, EntityKind::Company, company)? {
            println!(
                "company {company}: score {:.1} ({}) rules {:?}",
                score.score,
                score.severity,
                score.triggered
            );
        }
    }
    println!();

    for (company, fraud) in [(CLEAN_COMPANY, &clean_fraud), (SHELL_COMPANY, &shell_fraud)] {
        println!(
            "fraud {company}: {:.1} (confidence {:.2}, {} records)",
            fraud.overall_score, fraud.confidence, fraud.record_count
        );
        for factor in &fraud.factors {
            println!("    {} [{:.2}, {}] {}", factor.name, factor.score, factor.severity, factor.detail);
        }
    }
    println!();

    println!(
        "forecast {SHELL_COMPANY}: trend {} (confidence {:.0}, velocity {:+.1}, predicted {:+.1})",
        forecast.trend.as_str(),
        forecast.confidence,
        forecast.velocity,
        forecast.predicted_velocity
    );
    for warning in &forecast.warnings {
        println!("    warning: {warning}");
    }
    println!();

    println!(
        "open alerts: {}   audit rows: {}",
        store.open_alert_count(TENANT)?,
        store.audit_count(TENANT)?
    );

    Ok(())
}

/// Deterministic synthetic books: one unremarkable retailer and one
/// shell company exercising every detector.
fn seed_tenant(store: &RiskStore, config: &RiskConfig, seed: u64) -> Result<()> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);

    store.insert_tenant(TENANT, "Demo Tenant", date(2024, 1, 1))?;
    store.insert_company(TENANT, CLEAN_COMPANY, "Bosphorus Retail", Some("9010012345"))?;
    store.insert_company(TENANT, SHELL_COMPANY, "Nimbus Consulting", Some("9010067890"))?;

    let vendors = [
        "Marmara Lojistik",
        "Kristal Ambalaj",
        "Aegean Foods",
        "Pera Tekstil",
        "Delta Office",
        "Anadolu Enerji",
    ];

    // Retailer: spread-out business-hours activity, varied amounts.
    for i in 0..160u32 {
        let month = 1 + rng.gen_range(0..12);
        let day_of_month = 1 + rng.gen_range(0..27);
        let hour = 9 + rng.gen_range(0..8);
        let amount = 80.0 + rng.gen::<f64>() * 1400.0;
        store.insert_transaction(
            TENANT,
            &TransactionRecord {
                txn_id: format!("rt-{i:05}"),
                company_id: CLEAN_COMPANY.to_string(),
                posted_at: date(2024, month, day_of_month)
                    .and_hms_opt(hour, rng.gen_range(0..60), 0)
                    .expect("valid synthetic time"),
                amount,
                direction: "debit".to_string(),
                counterparty: Some(vendors[rng.gen_range(0..vendors.len())].to_string()),
                category: Some("purchase".to_string()),
            },
        )?;
    }

    let invoicing = InvoiceService::new(config.clone());
    for i in 0..24u32 {
        let month = 1 + (i % 12);
        let issue = date(2024, month, 1 + rng.gen_range(0..25));
        invoicing.register_invoice(
            store,
            &TENANT.into(),
            &InvoiceRecord {
                invoice_id: format!("rinv-{i:04}"),
                company_id: CLEAN_COMPANY.to_string(),
                external_number: Some(format!("BR-2024-{i:04}")),
                issue_date: issue,
                due_date: Some(issue + Duration::days(30)),
                total_amount: 250.0 + rng.gen::<f64>() * 4000.0,
                counterparty: Some(vendors[rng.gen_range(0..vendors.len())].to_string()),
                source_document_id: None,
            },
            issue,
        )?;
    }

    // Shell company: round month-end invoices on one counterparty,
    // plus a small-hours transaction burst.
    for i in 0..20u32 {
        let month = 1 + (i % 12);
        let issue = date(2024, month, MONTH_ENDS[(month - 1) as usize]);
        invoicing.register_invoice(
            store,
            &TENANT.into(),
            &InvoiceRecord {
                invoice_id: format!("sinv-{i:04}"),
                company_id: SHELL_COMPANY.to_string(),
                external_number: Some(format!("NC-2024-{:04}", i % 18)), // two collisions
                issue_date: issue,
                due_date: Some(issue + Duration::days(15)),
                total_amount: 10_000.0,
                counterparty: Some("Vortex Danışmanlık".to_string()),
                source_document_id: None,
            },
            issue,
        )?;
    }
    for i in 0..36u32 {
        store.insert_transaction(
            TENANT,
            &TransactionRecord {
                txn_id: format!("st-{i:05}"),
                company_id: SHELL_COMPANY.to_string(),
                posted_at: date(2024, 11, 1 + (i % 3))
                    .and_hms_opt(2, rng.gen_range(0..60), 0)
                    .expect("valid synthetic time"),
                amount: 9_400.0 + rng.gen::<f64>() * 400.0,
                direction: "credit".to_string(),
                counterparty: Some("Vortex Danışmanlık".to_string()),
                category: Some("transfer".to_string()),
            },
        )?;
    }

    Ok(())
}

/// Render a handful of the retailer's invoices as text documents and
/// upload them, including one with inverted dates.
fn upload_documents(
    store: &RiskStore,
    storage: &MemoryStorage,
    pipeline: &DocumentPipeline,
    seed: u64,
) -> Result<()> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed.wrapping_add(1));

    for i in 0..8u32 {
        let month = 1 + rng.gen_range(0..12);
        let issue = date(2024, month, 1 + rng.gen_range(0..25));
        let due = if i == 0 {
            issue - Duration::days(10) // one deliberately inverted
        } else {
            issue + Duration::days(30)
        };
        let total = 300.0 + rng.gen::<f64>() * 2500.0;
        let text = invoice_text(&format!("BR-2024-{:04}", 100 + i), issue, due, total);
        pipeline.upload_document(
            store,
            storage,
            &TENANT.into(),
            &CLEAN_COMPANY.into(),
            DocumentType::Invoice,
            &format!("2024/{month:02}/br-{i:04}.txt"),
            text.as_bytes(),
            issue,
        )?;
    }
    Ok(())
}

fn invoice_text(number: &str, issue: NaiveDate, due: NaiveDate, total: f64) -> String {
    format!(
        "Bosphorus Retail\n\
         Invoice No: {number}\n\
         Invoice Date: {}\n\
         Due Date: {}\n\
         Grand Total: {total:.2} TRY\n",
        issue.format("%d.%m.%Y"),
        due.format("%d.%m.%Y"),
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid synthetic date")
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
