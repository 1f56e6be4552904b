//! Forecast integration tests: fallback behavior, trend projection,
//! and early warnings over seeded score history.

use chrono::{Duration, NaiveDate};
use riskledger_core::{
    config::RiskConfig,
    error::RiskError,
    forecast::{RiskForecaster, TrendDirection},
    store::{RiskScoreRecord, RiskStore},
    types::{EntityKind, Severity},
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

fn seed_history(store: &RiskStore, start: NaiveDate, scores: &[f64]) {
    for (i, score) in scores.iter().enumerate() {
        store
            .append_score_history(
                TENANT,
                &RiskScoreRecord {
                    entity_kind: EntityKind::Company,
                    entity_id: COMPANY.to_string(),
                    score: *score,
                    severity: Severity::Low,
                    triggered: Vec::new(),
                    engine_version: "1.4".to_string(),
                    scored_on: start + Duration::days(i as i64),
                },
            )
            .unwrap();
    }
}

/// Under seven days of history: flat line at the average, fixed
/// confidence of 30.
#[test]
fn thin_history_falls_back_to_flat_projection() {
    let store = setup();
    seed_history(&store, day(2024, 3, 1), &[20.0, 30.0, 40.0, 50.0, 60.0]);

    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let forecast = forecaster
        .forecast_company(&store, &TENANT.into(), &COMPANY.into(), 14, day(2024, 3, 5))
        .unwrap();

    assert_eq!(forecast.confidence, 30.0);
    assert_eq!(forecast.points.len(), 14);
    let average = (20.0 + 30.0 + 40.0 + 50.0 + 60.0) / 5.0;
    for point in &forecast.points {
        assert_eq!(point.score, average);
    }
    assert_eq!(forecast.predicted_velocity, 0.0);
}

/// A clean upward trend projects monotonically non-decreasing scores
/// until the clamp at 100.
#[test]
fn upward_trend_projects_monotonically() {
    let store = setup();
    let scores: Vec<f64> = (0..14).map(|i| 20.0 + 3.0 * i as f64).collect();
    seed_history(&store, day(2024, 3, 1), &scores);

    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let forecast = forecaster
        .forecast_company(&store, &TENANT.into(), &COMPANY.into(), 30, day(2024, 3, 14))
        .unwrap();

    assert!(forecast.confidence > 30.0);
    let mut last = 0.0;
    for point in &forecast.points {
        assert!(point.score >= last, "projection dipped at {}", point.day);
        assert!(point.score <= 100.0);
        last = point.score;
    }
    // 3 points/day on a clean line: the fit predicts 21/week
    assert!((forecast.predicted_velocity - 21.0).abs() < 1e-6);
    assert_eq!(forecast.velocity, 21.0);
    assert_eq!(forecast.trend, TrendDirection::Stable);
}

/// Crossing the warning threshold from below emits an early warning.
#[test]
fn crossing_seventy_from_below_warns() {
    let store = setup();
    let scores: Vec<f64> = (0..10).map(|i| 40.0 + 3.0 * i as f64).collect();
    // history tops out at 67, the fitted line keeps climbing
    seed_history(&store, day(2024, 3, 1), &scores);

    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let forecast = forecaster
        .forecast_company(&store, &TENANT.into(), &COMPANY.into(), 14, day(2024, 3, 10))
        .unwrap();

    assert!(
        forecast
            .warnings
            .iter()
            .any(|w| w.contains("projected to cross")),
        "warnings: {:?}",
        forecast.warnings
    );
}

/// A stable series projects flat, stays stable, and warns about
/// nothing.
#[test]
fn flat_history_is_quiet() {
    let store = setup();
    seed_history(&store, day(2024, 3, 1), &[35.0; 14]);

    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let forecast = forecaster
        .forecast_company(&store, &TENANT.into(), &COMPANY.into(), 14, day(2024, 3, 14))
        .unwrap();

    assert_eq!(forecast.trend, TrendDirection::Stable);
    assert!(forecast.warnings.is_empty());
    for point in &forecast.points {
        assert!((point.score - 35.0).abs() < 1e-9);
    }
    // flat series fits perfectly: confidence caps at 95
    assert_eq!(forecast.confidence, 95.0);
}

/// No history at all still answers: flat zero, low confidence.
#[test]
fn no_history_projects_zero() {
    let store = setup();
    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let forecast = forecaster
        .forecast_company(&store, &TENANT.into(), &COMPANY.into(), 7, day(2024, 3, 14))
        .unwrap();
    assert_eq!(forecast.confidence, 30.0);
    assert!(forecast.points.iter().all(|p| p.score == 0.0));
    assert_eq!(forecast.trend, TrendDirection::Stable);
}

/// Forecasting an unknown company aborts with not-found.
#[test]
fn unknown_company_is_not_found() {
    let store = setup();
    let forecaster = RiskForecaster::new(RiskConfig::default_test());
    let err = forecaster
        .forecast_company(&store, &TENANT.into(), &"ghost".into(), 7, day(2024, 3, 14))
        .unwrap_err();
    assert!(matches!(err, RiskError::NotFound { .. }));
}
