//! Statistical fraud scorer.
//!
//! Outlier detection here is a combined Z-score + IQR test over
//! per-record features — not an isolation forest. The simpler test is
//! deliberate: it keeps every contribution explainable from the row
//! data. Pattern detectors cover amount clustering, timing, velocity,
//! and counterparty concentration; a behavioral-shift check compares
//! the two halves of the window and a network component carries the
//! raw concentration ratio.
//!
//! Failure semantics: an empty window is a zero assessment, never an
//! error; a company missing from the tenant is a hard not-found.

use crate::{
    alerting,
    config::{FraudConfig, RiskConfig},
    error::{RiskError, RiskResult},
    event::RiskEvent,
    store::{InvoiceRecord, RiskStore},
    types::{EntityId, EntityKind, Severity, TenantId},
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Source code carried by fraud alerts.
pub const FRAUD_ALERT_SOURCE: &str = "FRAUD_SCORE";

/// Trailing window used by check_and_alert: twelve months.
pub const DEFAULT_WINDOW_DAYS: i64 = 365;

/// Feature dimensions per observation: ln(1+amount), day-of-week,
/// day-of-month, hour, month.
const FEATURE_DIMS: usize = 5;

/// Dimensions that must agree before the consensus boost applies.
const CONSENSUS_DIMS: usize = 3;

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FraudFactor {
    pub name: String,
    /// Strength of this signal in [0,1].
    pub score: f64,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FraudAssessment {
    pub company_id: EntityId,
    /// Overall suspicion in [0,100].
    pub overall_score: f64,
    /// How much data backed the score, in [0,1] — not a probability.
    pub confidence: f64,
    pub record_count: usize,
    pub factors: Vec<FraudFactor>,
}

impl FraudAssessment {
    fn empty(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            overall_score: 0.0,
            confidence: 0.0,
            record_count: 0,
            factors: Vec::new(),
        }
    }
}

/// One observation in the window: a transaction, or an invoice pinned
/// to midnight of its issue date.
#[derive(Debug, Clone, Copy)]
struct Observation {
    amount: f64,
    at: NaiveDateTime,
}

impl Observation {
    fn features(&self) -> [f64; FEATURE_DIMS] {
        [
            (1.0 + self.amount.abs()).ln(),
            self.at.weekday().num_days_from_monday() as f64,
            self.at.day() as f64,
            self.at.hour() as f64,
            self.at.month() as f64,
        ]
    }
}

// ── Scorer ───────────────────────────────────────────────────────────────────

pub struct FraudScorer {
    config: RiskConfig,
}

impl FraudScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    fn fraud(&self) -> &FraudConfig {
        &self.config.fraud
    }

    /// Score a company over the trailing `window_days` ending at `as_of`.
    pub fn score_company(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        company_id: &EntityId,
        window_days: i64,
        as_of: NaiveDate,
    ) -> RiskResult<FraudAssessment> {
        if store.get_company(tenant, company_id)?.is_none() {
            return Err(RiskError::not_found("company", tenant, company_id));
        }

        let from = as_of - Duration::days(window_days);
        let txns = store.transactions_in_window(
            tenant,
            company_id,
            from.and_time(NaiveTime::MIN),
            (as_of + Duration::days(1)).and_time(NaiveTime::MIN),
        )?;
        let invoices = store.invoices_in_window(tenant, company_id, from, as_of)?;

        let mut observations: Vec<Observation> = txns
            .iter()
            .map(|t| Observation {
                amount: t.amount,
                at: t.posted_at,
            })
            .collect();
        observations.extend(invoices.iter().map(|i| Observation {
            amount: i.total_amount,
            at: i.issue_date.and_time(NaiveTime::MIN),
        }));
        observations.sort_by_key(|o| o.at);

        let record_count = observations.len();
        if record_count == 0 {
            return Ok(FraudAssessment::empty(company_id));
        }

        let fraud = self.fraud();
        let mut factors = Vec::new();

        let outlier = outlier_score(&observations, fraud.min_records);
        if outlier > 0.0 {
            factors.push(FraudFactor {
                name: "statistical_outliers".to_string(),
                score: outlier,
                severity: if outlier >= 0.5 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                detail: format!("outlier ratio {outlier:.2} across {FEATURE_DIMS} dimensions"),
            });
        }

        let pattern_start = factors.len();
        factors.extend(self.detect_patterns(&observations, &invoices));
        let pattern_range = pattern_start..factors.len();

        let behavioral = behavioral_shift(&observations);
        if behavioral > 0.0 {
            factors.push(FraudFactor {
                name: "behavioral_shift".to_string(),
                score: behavioral,
                severity: if behavioral >= 0.5 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                detail: "mean amount shifted between window halves".to_string(),
            });
        }

        let network = concentration_ratio(&invoices);
        if network > 0.0 {
            factors.push(FraudFactor {
                name: "counterparty_network".to_string(),
                score: network,
                severity: if network > fraud.concentration_threshold {
                    Severity::High
                } else {
                    Severity::Low
                },
                detail: format!("top counterparty carries {:.0}% of invoices", network * 100.0),
            });
        }

        let pattern_contrib: f64 = factors[pattern_range.clone()]
            .iter()
            .map(|p| severity_weight(p.severity) * p.score)
            .sum::<f64>()
            * fraud.pattern_scale
            * 100.0;

        let mut overall = outlier * fraud.outlier_weight
            + behavioral * fraud.behavioral_weight
            + network * fraud.network_weight
            + pattern_contrib;

        // Floors: a single strong signal must stay visible even when
        // the weighted sum dilutes it.
        if network > 0.5 {
            overall = overall.max(25.0);
        }
        if factors[pattern_range]
            .iter()
            .any(|p| p.severity >= Severity::High)
        {
            overall = overall.max(30.0);
        }
        if factors.iter().any(|f| f.score > 0.5) {
            overall = overall.max(20.0);
        }

        let overall = overall.clamp(0.0, 100.0);
        let confidence = (record_count as f64 / 100.0).min(1.0);

        log::debug!(
            "tenant={tenant} fraud score for {company_id}: {overall:.1} \
             (confidence {confidence:.2}, {} factors, {record_count} records)",
            factors.len()
        );

        Ok(FraudAssessment {
            company_id: company_id.clone(),
            overall_score: overall,
            confidence,
            record_count,
            factors,
        })
    }

    /// Score over the default window, audit the result, and raise an
    /// alert when it crosses the alert threshold. Alerting and audit
    /// are side calls — they never fail the assessment.
    pub fn check_and_alert(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        company_id: &EntityId,
        as_of: NaiveDate,
    ) -> RiskResult<FraudAssessment> {
        let assessment =
            self.score_company(store, tenant, company_id, DEFAULT_WINDOW_DAYS, as_of)?;

        let event = RiskEvent::FraudAssessed {
            tenant_id: tenant.clone(),
            company_id: company_id.clone(),
            overall_score: assessment.overall_score,
            confidence: assessment.confidence,
            factors: assessment.factors.iter().map(|f| f.name.clone()).collect(),
        };
        if let Err(e) = store.append_audit(tenant, company_id, &event, as_of) {
            log::warn!("tenant={tenant} fraud audit failed for {company_id}: {e}");
        }

        let fraud = self.fraud();
        if assessment.overall_score >= fraud.alert_threshold {
            let severity = if assessment.overall_score >= fraud.alert_high_threshold {
                Severity::High
            } else {
                Severity::Medium
            };
            if let Err(e) = alerting::raise_alert(
                store,
                tenant,
                EntityKind::Company,
                company_id,
                FRAUD_ALERT_SOURCE,
                assessment.overall_score,
                severity,
                as_of,
            ) {
                log::warn!("tenant={tenant} fraud alert failed for {company_id}: {e}");
            }
        }

        Ok(assessment)
    }

    // ── Pattern detectors ────────────────────────────────────────

    fn detect_patterns(
        &self,
        observations: &[Observation],
        invoices: &[InvoiceRecord],
    ) -> Vec<FraudFactor> {
        let fraud = self.fraud();
        let mut patterns = Vec::new();

        if let Some(factor) = amount_clustering(
            observations,
            fraud.cluster_min_size,
            fraud.cluster_tolerance,
        ) {
            patterns.push(factor);
        }
        if let Some(factor) = timing_anomaly(
            observations,
            fraud.business_hours,
            fraud.off_hours_share_threshold,
            fraud.weekend_share_threshold,
        ) {
            patterns.push(factor);
        }
        if let Some(factor) = velocity_anomaly(observations, fraud.velocity_per_day) {
            patterns.push(factor);
        }
        if let Some(factor) =
            concentration_pattern(invoices, fraud.concentration_threshold)
        {
            patterns.push(factor);
        }
        patterns
    }
}

/// Pattern contributions are weighted by their severity before the
/// global pattern scaling.
fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.3,
        Severity::Medium => 0.6,
        Severity::High => 1.0,
        Severity::Critical => 1.5,
    }
}

// ── Statistical outliers ─────────────────────────────────────────────────────

/// Combined Z-score + IQR outlier ratio in [0,1]. Needs at least
/// `min_records` observations; below that the signal is 0.
fn outlier_score(observations: &[Observation], min_records: usize) -> f64 {
    let n = observations.len();
    if n < min_records {
        return 0.0;
    }

    let matrix: Vec<[f64; FEATURE_DIMS]> = observations.iter().map(|o| o.features()).collect();

    // Per-dimension summary statistics.
    let mut flagged = vec![0usize; n];
    for dim in 0..FEATURE_DIMS {
        let column: Vec<f64> = matrix.iter().map(|row| row[dim]).collect();
        let mean = mean(&column);
        let std = std_dev(&column, mean);
        let (q1, q3) = quartiles(&column);
        let iqr = q3 - q1;

        for (record, value) in column.iter().enumerate() {
            let z_flag = std > 1e-9 && ((value - mean) / std).abs() > 2.0;
            let iqr_flag = iqr > 1e-9
                && (*value < q1 - 1.5 * iqr || *value > q3 + 1.5 * iqr);
            if z_flag || iqr_flag {
                flagged[record] += 1;
            }
        }
    }

    let base = flagged
        .iter()
        .map(|count| *count as f64 / FEATURE_DIMS as f64)
        .sum::<f64>()
        / n as f64;
    // Consensus boost: records anomalous in several dimensions at once
    // weigh more than scattered single-dimension flags.
    let consensus =
        flagged.iter().filter(|count| **count >= CONSENSUS_DIMS).count() as f64 / n as f64;

    (base + 0.25 * consensus).min(1.0)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolated Q1/Q3 of an unsorted slice.
fn quartiles(values: &[f64]) -> (f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    (percentile(&sorted, 0.25), percentile(&sorted, 0.75))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (idx - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

// ── Pattern detectors ────────────────────────────────────────────────────────

/// Largest run of amounts within `tolerance` of a common mean.
fn amount_clustering(
    observations: &[Observation],
    min_size: usize,
    tolerance: f64,
) -> Option<FraudFactor> {
    if observations.len() < min_size {
        return None;
    }

    let mut amounts: Vec<f64> = observations.iter().map(|o| o.amount.abs()).collect();
    amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut best_size = 0usize;
    let mut best_mean = 0.0;
    let mut cluster_sum = amounts[0];
    let mut cluster_len = 1usize;
    for amount in amounts.iter().skip(1) {
        let cluster_mean = cluster_sum / cluster_len as f64;
        let within = if cluster_mean > f64::EPSILON {
            (amount - cluster_mean).abs() / cluster_mean <= tolerance
        } else {
            (amount - cluster_mean).abs() <= tolerance
        };
        if within {
            cluster_sum += amount;
            cluster_len += 1;
        } else {
            if cluster_len > best_size {
                best_size = cluster_len;
                best_mean = cluster_sum / cluster_len as f64;
            }
            cluster_sum = *amount;
            cluster_len = 1;
        }
    }
    if cluster_len > best_size {
        best_size = cluster_len;
        best_mean = cluster_sum / cluster_len as f64;
    }

    if best_size < min_size {
        return None;
    }

    let share = best_size as f64 / observations.len() as f64;
    let severity = if share >= 0.5 && best_size >= 10 {
        Severity::Critical
    } else if share >= 0.5 {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(FraudFactor {
        name: "amount_clustering".to_string(),
        score: share,
        severity,
        detail: format!(
            "{best_size} of {} amounts within {:.0}% of {best_mean:.2}",
            observations.len(),
            tolerance * 100.0
        ),
    })
}

/// Too much activity outside business hours or on weekends.
fn timing_anomaly(
    observations: &[Observation],
    business_hours: (u32, u32),
    off_hours_threshold: f64,
    weekend_threshold: f64,
) -> Option<FraudFactor> {
    if observations.is_empty() {
        return None;
    }
    let n = observations.len() as f64;
    let (open, close) = business_hours;

    let off_hours = observations
        .iter()
        .filter(|o| o.at.hour() < open || o.at.hour() >= close)
        .count() as f64
        / n;
    let weekend = observations
        .iter()
        .filter(|o| {
            matches!(
                o.at.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            )
        })
        .count() as f64
        / n;

    let off_excess = excess_ratio(off_hours, off_hours_threshold);
    let weekend_excess = excess_ratio(weekend, weekend_threshold);
    let score = off_excess.max(weekend_excess);
    if score <= 0.0 {
        return None;
    }

    let severity = if score >= 0.5 {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(FraudFactor {
        name: "timing_anomaly".to_string(),
        score,
        severity,
        detail: format!(
            "{:.0}% off-hours, {:.0}% weekend activity",
            off_hours * 100.0,
            weekend * 100.0
        ),
    })
}

/// How far a share sits above its threshold, normalized to [0,1].
fn excess_ratio(share: f64, threshold: f64) -> f64 {
    if share <= threshold || threshold >= 1.0 {
        0.0
    } else {
        ((share - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
    }
}

/// Sustained records-per-day rate over the observed span.
fn velocity_anomaly(observations: &[Observation], per_day_threshold: f64) -> Option<FraudFactor> {
    if observations.len() < 2 {
        return None;
    }
    let first = observations.first()?.at.date();
    let last = observations.last()?.at.date();
    let span_days = ((last - first).num_days() + 1).max(1) as f64;
    let rate = observations.len() as f64 / span_days;
    if rate <= per_day_threshold {
        return None;
    }

    let score = (rate / (2.5 * per_day_threshold)).min(1.0);
    let severity = if rate > 2.0 * per_day_threshold {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(FraudFactor {
        name: "transaction_velocity".to_string(),
        score,
        severity,
        detail: format!("{rate:.1} records/day over {span_days:.0} days"),
    })
}

/// One counterparty carrying more than the threshold share of invoices.
fn concentration_pattern(
    invoices: &[InvoiceRecord],
    threshold: f64,
) -> Option<FraudFactor> {
    let share = concentration_ratio(invoices);
    if share <= threshold {
        return None;
    }
    let severity = if share >= 0.75 {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(FraudFactor {
        name: "counterparty_concentration".to_string(),
        score: share,
        severity,
        detail: format!("top counterparty on {:.0}% of invoices", share * 100.0),
    })
}

/// Share of invoices carried by the single busiest counterparty, over
/// invoices that name one. Zero below three named invoices — one or
/// two rows say nothing about concentration.
fn concentration_ratio(invoices: &[InvoiceRecord]) -> f64 {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for invoice in invoices {
        if let Some(counterparty) = invoice.counterparty.as_deref() {
            *counts.entry(counterparty).or_insert(0) += 1;
        }
    }
    let named: usize = counts.values().sum();
    if named < 3 {
        return 0.0;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    top as f64 / named as f64
}

/// Relative change of the mean amount between the two halves of the
/// window, with a 20% dead zone. Needs at least six observations.
fn behavioral_shift(observations: &[Observation]) -> f64 {
    if observations.len() < 6 {
        return 0.0;
    }
    let mid = observations.len() / 2;
    let first = mean(&observations[..mid].iter().map(|o| o.amount.abs()).collect::<Vec<_>>());
    let second = mean(&observations[mid..].iter().map(|o| o.amount.abs()).collect::<Vec<_>>());
    if first <= f64::EPSILON {
        return 0.0;
    }
    let relative = (second - first).abs() / first;
    if relative <= 0.2 {
        0.0
    } else {
        ((relative - 0.2) / 2.0).min(1.0)
    }
}
