//! Scoring configuration: severity thresholds, the rule catalog, fraud
//! scorer tuning, and forecast tuning.
//!
//! RULE: this is the single configuration surface. Every path that maps
//! a score to a severity goes through `SeverityThresholds::classify`;
//! no caller hard-codes its own cutoffs. Configuration is an explicit
//! object passed into service constructors — never process state.

use crate::types::Severity;
use serde::{Deserialize, Serialize};

/// Score-to-severity cutoffs, tenant-configurable.
/// A score below `medium` is low severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl SeverityThresholds {
    pub fn classify(&self, score: f64) -> Severity {
        if score >= self.critical {
            Severity::Critical
        } else if score >= self.high {
            Severity::High
        } else if score >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            medium: 40.0,
            high: 70.0,
            critical: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Document,
    Company,
}

/// Trigger condition evaluated against a FeatureSet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Fires when the named boolean flag is present.
    FlagSet { flag: String },
    /// Fires when the named numeric feature is present and >= threshold.
    NumericAtLeast { feature: String, threshold: f64 },
    /// Fires when the named numeric feature is present and < threshold.
    NumericBelow { feature: String, threshold: f64 },
}

/// A named, weighted condition contributing to a risk score.
/// `severity` is the default severity attached to alerts raised for
/// this rule in isolation (e.g. the duplicate-invoice side check);
/// score-level severity always comes from the thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub code: String,
    pub scope: RuleScope,
    pub weight: f64,
    pub severity: Severity,
    pub trigger: RuleTrigger,
}

/// Tuning for the statistical fraud scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    /// Minimum records before the outlier test produces a signal.
    pub min_records: usize,
    /// Inclusive start / exclusive end of business hours.
    pub business_hours: (u32, u32),
    pub off_hours_share_threshold: f64,
    pub weekend_share_threshold: f64,
    pub cluster_min_size: usize,
    /// Relative tolerance around a cluster mean (0.05 = 5%).
    pub cluster_tolerance: f64,
    /// Sustained transactions per day considered anomalous.
    pub velocity_per_day: f64,
    /// Share of invoices on one counterparty considered concentrated.
    pub concentration_threshold: f64,
    pub outlier_weight: f64,
    pub behavioral_weight: f64,
    pub network_weight: f64,
    pub pattern_scale: f64,
    /// Overall score at which check_and_alert raises an alert.
    pub alert_threshold: f64,
    /// Overall score at which that alert is high instead of medium.
    pub alert_high_threshold: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            min_records: 10,
            business_hours: (8, 18),
            off_hours_share_threshold: 0.30,
            weekend_share_threshold: 0.20,
            cluster_min_size: 5,
            cluster_tolerance: 0.05,
            velocity_per_day: 10.0,
            concentration_threshold: 0.50,
            outlier_weight: 30.0,
            behavioral_weight: 30.0,
            network_weight: 20.0,
            pattern_scale: 0.2,
            alert_threshold: 50.0,
            alert_high_threshold: 70.0,
        }
    }
}

/// Tuning for the linear-trend risk forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Days of history below which the forecast falls back to a flat line.
    pub min_history_days: usize,
    /// Most recent data points used for the least-squares fit.
    pub fit_window: usize,
    /// Confidence reported by the flat-line fallback.
    pub fallback_confidence: f64,
    /// Projected score that triggers an early warning when crossed
    /// from below.
    pub warning_score: f64,
    /// Absolute acceleration (predicted velocity minus observed
    /// velocity) that triggers an early warning.
    pub acceleration_warning: f64,
    /// Relative band within which velocities count as stable (0.20 = 20%).
    pub trend_hysteresis: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_days: 7,
            fit_window: 30,
            fallback_confidence: 30.0,
            warning_score: 70.0,
            acceleration_warning: 10.0,
            trend_hysteresis: 0.20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub thresholds: SeverityThresholds,
    pub rules: Vec<RuleConfig>,
    pub fraud: FraudConfig,
    pub forecast: ForecastConfig,
    /// A processing job is parked as failed after this many attempts.
    pub max_job_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct RulesFile {
    rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScoringFile {
    thresholds: SeverityThresholds,
    fraud: FraudConfig,
    forecast: ForecastConfig,
    max_job_attempts: u32,
}

impl RiskConfig {
    /// Load from the data/ directory.
    /// In tests, use RiskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let rules_path = format!("{data_dir}/rules.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {rules_path}: {e}"))?;
        let rules_file: RulesFile = serde_json::from_str(&rules_content)?;

        let scoring_path = format!("{data_dir}/scoring.json");
        let scoring_content = std::fs::read_to_string(&scoring_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {scoring_path}: {e}"))?;
        let scoring_file: ScoringFile = serde_json::from_str(&scoring_content)?;

        Ok(Self {
            thresholds: scoring_file.thresholds,
            rules: rules_file.rules,
            fraud: scoring_file.fraud,
            forecast: scoring_file.forecast,
            max_job_attempts: scoring_file.max_job_attempts,
        })
    }

    /// Look up a rule by code.
    pub fn rule(&self, code: &str) -> Option<&RuleConfig> {
        self.rules.iter().find(|r| r.code == code)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        use crate::feature_extractor as feat;

        let rules = vec![
            RuleConfig {
                code: feat::DUE_BEFORE_ISSUE.into(),
                scope: RuleScope::Document,
                weight: 30.0,
                severity: Severity::Medium,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::DUE_BEFORE_ISSUE.into(),
                },
            },
            RuleConfig {
                code: feat::DUPLICATE_INVOICE_NUMBER.into(),
                scope: RuleScope::Document,
                weight: 40.0,
                severity: Severity::High,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::DUPLICATE_INVOICE_NUMBER.into(),
                },
            },
            RuleConfig {
                code: feat::MISSING_INVOICE_NUMBER.into(),
                scope: RuleScope::Document,
                weight: 15.0,
                severity: Severity::Low,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::MISSING_INVOICE_NUMBER.into(),
                },
            },
            RuleConfig {
                code: feat::MISSING_AMOUNT.into(),
                scope: RuleScope::Document,
                weight: 15.0,
                severity: Severity::Low,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::MISSING_AMOUNT.into(),
                },
            },
            RuleConfig {
                code: feat::ROUND_AMOUNT.into(),
                scope: RuleScope::Document,
                weight: 10.0,
                severity: Severity::Low,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::ROUND_AMOUNT.into(),
                },
            },
            RuleConfig {
                code: feat::WEEKEND_ISSUED.into(),
                scope: RuleScope::Document,
                weight: 5.0,
                severity: Severity::Low,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::WEEKEND_ISSUED.into(),
                },
            },
            RuleConfig {
                code: feat::LONG_PAYMENT_TERM.into(),
                scope: RuleScope::Document,
                weight: 10.0,
                severity: Severity::Low,
                trigger: RuleTrigger::FlagSet {
                    flag: feat::LONG_PAYMENT_TERM.into(),
                },
            },
            RuleConfig {
                code: "LARGE_AMOUNT".into(),
                scope: RuleScope::Document,
                weight: 20.0,
                severity: Severity::Medium,
                trigger: RuleTrigger::NumericAtLeast {
                    feature: feat::TOTAL_AMOUNT.into(),
                    threshold: 100_000.0,
                },
            },
            RuleConfig {
                code: "OPEN_ALERT_BACKLOG".into(),
                scope: RuleScope::Company,
                weight: 15.0,
                severity: Severity::Medium,
                trigger: RuleTrigger::NumericAtLeast {
                    feature: feat::OPEN_ALERT_COUNT.into(),
                    threshold: 3.0,
                },
            },
            RuleConfig {
                code: "CRITICAL_DOCUMENT".into(),
                scope: RuleScope::Company,
                weight: 20.0,
                severity: Severity::High,
                trigger: RuleTrigger::NumericAtLeast {
                    feature: feat::MAX_DOCUMENT_SCORE.into(),
                    threshold: 90.0,
                },
            },
        ];

        Self {
            thresholds: SeverityThresholds::default(),
            rules,
            fraud: FraudConfig::default(),
            forecast: ForecastConfig::default(),
            max_job_attempts: 3,
        }
    }
}
