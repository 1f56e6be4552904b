//! Weighted risk rule engine.
//!
//! Algorithm: evaluate every applicable rule's trigger against the
//! entity's features (documents) or aggregates (companies), sum the
//! weights of triggered rules, clamp to [0,100], classify severity
//! through the tenant thresholds, persist the score with the sorted
//! triggered codes, and raise an alert at high severity or above.
//!
//! RULE: evaluation is deterministic — the same stored data always
//! yields the same score and triggered set.

use crate::{
    alerting,
    config::{RiskConfig, RuleScope, RuleTrigger},
    error::{RiskError, RiskResult},
    event::RiskEvent,
    feature_extractor as feat,
    feature_extractor::FeatureSet,
    store::{RiskScoreRecord, RiskStore},
    types::{EntityId, EntityKind, Severity, TenantId},
};
use chrono::NaiveDate;

/// Version tag persisted with every score row.
pub const ENGINE_VERSION: &str = "1.4";

/// Source code carried by score-threshold alerts.
pub const SCORE_ALERT_SOURCE: &str = "RISK_SCORE";

/// How many recent document scores feed the company rollup.
const ROLLUP_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub severity: Severity,
    pub triggered: Vec<String>,
}

pub struct RuleEngine {
    config: RiskConfig,
}

impl RuleEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Score one document from its stored features. Missing features
    /// mean "nothing triggered", not an error.
    pub fn evaluate_document(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        document_id: &EntityId,
        as_of: NaiveDate,
    ) -> RiskResult<ScoreOutcome> {
        if store.get_document(tenant, document_id)?.is_none() {
            return Err(RiskError::not_found("document", tenant, document_id));
        }
        let features = store
            .get_risk_features(tenant, document_id)?
            .unwrap_or_default();
        let (raw, triggered) = self.apply_rules(RuleScope::Document, &features);
        self.persist(store, tenant, EntityKind::Document, document_id, raw, triggered, as_of)
    }

    /// Score one company from its documents' most recent scores plus
    /// the company-scoped rules. The rollup blends mean and worst-case:
    /// 0.6·mean + 0.4·max over the trailing window.
    pub fn evaluate_company(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        company_id: &EntityId,
        as_of: NaiveDate,
    ) -> RiskResult<ScoreOutcome> {
        if store.get_company(tenant, company_id)?.is_none() {
            return Err(RiskError::not_found("company", tenant, company_id));
        }

        let doc_scores = store.recent_document_scores(tenant, company_id, ROLLUP_WINDOW)?;
        let mut aggregates = FeatureSet::default();
        aggregates.set_numeric(feat::DOCUMENT_COUNT, doc_scores.len() as f64);

        let base = if doc_scores.is_empty() {
            0.0
        } else {
            let mean = doc_scores.iter().sum::<f64>() / doc_scores.len() as f64;
            let max = doc_scores.iter().cloned().fold(0.0_f64, f64::max);
            aggregates.set_numeric(feat::MEAN_DOCUMENT_SCORE, mean);
            aggregates.set_numeric(feat::MAX_DOCUMENT_SCORE, max);
            0.6 * mean + 0.4 * max
        };

        let open_alerts = store.open_alert_count_for_company(tenant, company_id)?;
        aggregates.set_numeric(feat::OPEN_ALERT_COUNT, open_alerts as f64);

        let (rule_score, triggered) = self.apply_rules(RuleScope::Company, &aggregates);
        self.persist(
            store,
            tenant,
            EntityKind::Company,
            company_id,
            base + rule_score,
            triggered,
            as_of,
        )
    }

    fn apply_rules(&self, scope: RuleScope, features: &FeatureSet) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut triggered = Vec::new();
        for rule in self.config.rules.iter().filter(|r| r.scope == scope) {
            if trigger_fires(&rule.trigger, features) {
                total += rule.weight;
                triggered.push(rule.code.clone());
            }
        }
        triggered.sort();
        (total, triggered)
    }

    fn persist(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        kind: EntityKind,
        entity_id: &EntityId,
        raw_score: f64,
        triggered: Vec<String>,
        as_of: NaiveDate,
    ) -> RiskResult<ScoreOutcome> {
        let score = raw_score.clamp(0.0, 100.0);
        let severity = self.config.thresholds.classify(score);

        let record = RiskScoreRecord {
            entity_kind: kind,
            entity_id: entity_id.clone(),
            score,
            severity,
            triggered: triggered.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            scored_on: as_of,
        };
        store.save_risk_score(tenant, &record)?;
        store.append_audit(
            tenant,
            entity_id,
            &RiskEvent::RiskScoreComputed {
                tenant_id: tenant.clone(),
                entity_kind: kind,
                entity_id: entity_id.clone(),
                score,
                severity,
                triggered: triggered.clone(),
            },
            as_of,
        )?;

        // Alerting is a side call: log and carry on if it fails.
        if severity >= Severity::High {
            if let Err(e) = alerting::raise_alert(
                store,
                tenant,
                kind,
                entity_id,
                SCORE_ALERT_SOURCE,
                score,
                severity,
                as_of,
            ) {
                log::warn!(
                    "tenant={tenant} alert side-effect failed for {} {entity_id}: {e}",
                    kind.as_str()
                );
            }
        }

        log::debug!(
            "tenant={tenant} scored {} {entity_id}: {score:.1} ({severity}), {} rules",
            kind.as_str(),
            triggered.len()
        );
        Ok(ScoreOutcome {
            score,
            severity,
            triggered,
        })
    }
}

fn trigger_fires(trigger: &RuleTrigger, features: &FeatureSet) -> bool {
    match trigger {
        RuleTrigger::FlagSet { flag } => features.has_flag(flag),
        RuleTrigger::NumericAtLeast { feature, threshold } => features
            .numeric(feature)
            .map(|v| v >= *threshold)
            .unwrap_or(false),
        RuleTrigger::NumericBelow { feature, threshold } => features
            .numeric(feature)
            .map(|v| v < *threshold)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;

    #[test]
    fn trigger_kinds_respect_missing_features() {
        let mut features = FeatureSet::default();
        features.set_numeric("total_amount", 50.0);

        let at_least = RuleTrigger::NumericAtLeast {
            feature: "total_amount".into(),
            threshold: 50.0,
        };
        assert!(trigger_fires(&at_least, &features));

        let missing = RuleTrigger::NumericAtLeast {
            feature: "absent".into(),
            threshold: 0.0,
        };
        assert!(!trigger_fires(&missing, &features));

        let below = RuleTrigger::NumericBelow {
            feature: "total_amount".into(),
            threshold: 50.0,
        };
        assert!(!trigger_fires(&below, &features));
    }

    #[test]
    fn severity_is_monotonic_in_score() {
        let config = RiskConfig::default_test();
        let mut last = crate::types::Severity::Low;
        for score in 0..=100 {
            let severity = config.thresholds.classify(score as f64);
            assert!(severity >= last, "severity regressed at score {score}");
            last = severity;
        }
    }
}
