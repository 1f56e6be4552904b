//! Linear-trend risk forecast.
//!
//! Projects a company's per-day average risk score forward with an
//! ordinary least-squares fit over the most recent history. Thin
//! history falls back to a flat line at the current average with a
//! fixed low confidence rather than refusing to answer.

use crate::{
    config::{ForecastConfig, RiskConfig},
    error::{RiskError, RiskResult},
    event::RiskEvent,
    store::{DailyScore, RiskStore},
    types::{EntityId, TenantId},
};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Accelerating,
    Decelerating,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accelerating => "accelerating",
            Self::Decelerating => "decelerating",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub day: NaiveDate,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskForecast {
    pub company_id: EntityId,
    pub points: Vec<ForecastPoint>,
    /// Confidence in [0,100]; the flat fallback reports a fixed 30.
    pub confidence: f64,
    /// Observed score delta over the trailing week.
    pub velocity: f64,
    /// Velocity the fitted line predicts for the coming week.
    pub predicted_velocity: f64,
    pub trend: TrendDirection,
    pub warnings: Vec<String>,
}

pub struct RiskForecaster {
    config: RiskConfig,
}

impl RiskForecaster {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Project the company's risk score `horizon_days` forward from
    /// `as_of`, based on its stored score history.
    pub fn forecast_company(
        &self,
        store: &RiskStore,
        tenant: &TenantId,
        company_id: &EntityId,
        horizon_days: u32,
        as_of: NaiveDate,
    ) -> RiskResult<RiskForecast> {
        if store.get_company(tenant, company_id)?.is_none() {
            return Err(RiskError::not_found("company", tenant, company_id));
        }

        let history = store.daily_company_scores(tenant, company_id)?;
        let fc = &self.config.forecast;

        let forecast = if history.len() < fc.min_history_days {
            flat_projection(company_id, &history, horizon_days, as_of, fc)
        } else {
            fitted_projection(company_id, &history, horizon_days, as_of, fc)
        };

        // Audit is a side call; never fails the forecast.
        let event = RiskEvent::ForecastComputed {
            tenant_id: tenant.clone(),
            company_id: company_id.clone(),
            horizon_days,
            trend: forecast.trend.as_str().to_string(),
            warning_count: forecast.warnings.len(),
        };
        if let Err(e) = store.append_audit(tenant, company_id, &event, as_of) {
            log::warn!("tenant={tenant} forecast audit failed for {company_id}: {e}");
        }

        Ok(forecast)
    }
}

/// Flat line at the historical average. Velocity still comes from the
/// available points so the trend classification stays meaningful.
fn flat_projection(
    company_id: &str,
    history: &[DailyScore],
    horizon_days: u32,
    as_of: NaiveDate,
    fc: &ForecastConfig,
) -> RiskForecast {
    let average = if history.is_empty() {
        0.0
    } else {
        history.iter().map(|d| d.score).sum::<f64>() / history.len() as f64
    };

    let points = (1..=horizon_days)
        .map(|offset| ForecastPoint {
            day: as_of + Duration::days(offset as i64),
            score: average.clamp(0.0, 100.0),
        })
        .collect::<Vec<_>>();

    let velocity = trailing_week_velocity(history);
    let predicted_velocity = 0.0;
    let trend = classify_trend(velocity, predicted_velocity, fc.trend_hysteresis);
    let current = history.last().map(|d| d.score).unwrap_or(0.0);
    let warnings = early_warnings(current, &points, velocity, predicted_velocity, fc);

    RiskForecast {
        company_id: company_id.to_string(),
        points,
        confidence: fc.fallback_confidence,
        velocity,
        predicted_velocity,
        trend,
        warnings,
    }
}

/// OLS fit over the most recent `fit_window` points, projected forward
/// and clamped to [0,100]. Confidence scales with R².
fn fitted_projection(
    company_id: &str,
    history: &[DailyScore],
    horizon_days: u32,
    as_of: NaiveDate,
    fc: &ForecastConfig,
) -> RiskForecast {
    let start = history.len().saturating_sub(fc.fit_window);
    let window = &history[start..];
    let n = window.len();

    let (slope, intercept, r_squared) = least_squares(window);

    let points = (1..=horizon_days)
        .map(|offset| {
            let x = (n - 1) as f64 + offset as f64;
            ForecastPoint {
                day: as_of + Duration::days(offset as i64),
                score: (intercept + slope * x).clamp(0.0, 100.0),
            }
        })
        .collect::<Vec<_>>();

    let velocity = trailing_week_velocity(history);
    let predicted_velocity = slope * 7.0;
    let trend = classify_trend(velocity, predicted_velocity, fc.trend_hysteresis);
    let confidence = (30.0 + r_squared * 65.0).clamp(0.0, 95.0);

    let current = history.last().map(|d| d.score).unwrap_or(0.0);
    let warnings = early_warnings(current, &points, velocity, predicted_velocity, fc);

    RiskForecast {
        company_id: company_id.to_string(),
        points,
        confidence,
        velocity,
        predicted_velocity,
        trend,
        warnings,
    }
}

/// Slope, intercept, and R² of scores over their index positions.
fn least_squares(window: &[DailyScore]) -> (f64, f64, f64) {
    let n = window.len() as f64;
    let xs = |i: usize| i as f64;

    let x_mean = (0..window.len()).map(xs).sum::<f64>() / n;
    let y_mean = window.iter().map(|d| d.score).sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, point) in window.iter().enumerate() {
        ss_xy += (xs(i) - x_mean) * (point.score - y_mean);
        ss_xx += (xs(i) - x_mean).powi(2);
    }
    let slope = if ss_xx > f64::EPSILON { ss_xy / ss_xx } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, point) in window.iter().enumerate() {
        let fitted = intercept + slope * xs(i);
        ss_res += (point.score - fitted).powi(2);
        ss_tot += (point.score - y_mean).powi(2);
    }
    // A perfectly flat series is a perfect flat fit.
    let r_squared = if ss_tot > f64::EPSILON {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        1.0
    };

    (slope, intercept, r_squared)
}

/// Observed score delta over the trailing seven days of history.
fn trailing_week_velocity(history: &[DailyScore]) -> f64 {
    let Some(last) = history.last() else {
        return 0.0;
    };
    let week_ago = last.day - Duration::days(7);
    let reference = history
        .iter()
        .rev()
        .find(|d| d.day <= week_ago)
        .or_else(|| history.first());
    match reference {
        Some(point) if point.day < last.day => last.score - point.score,
        _ => 0.0,
    }
}

/// Compare velocity magnitudes with a hysteresis band so the label
/// does not flap on small changes.
fn classify_trend(velocity: f64, predicted_velocity: f64, hysteresis: f64) -> TrendDirection {
    let observed = velocity.abs();
    let predicted = predicted_velocity.abs();
    if predicted > observed * (1.0 + hysteresis) && predicted > f64::EPSILON {
        TrendDirection::Accelerating
    } else if predicted < observed * (1.0 - hysteresis) {
        TrendDirection::Decelerating
    } else {
        TrendDirection::Stable
    }
}

fn early_warnings(
    current: f64,
    points: &[ForecastPoint],
    velocity: f64,
    predicted_velocity: f64,
    fc: &ForecastConfig,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if current < fc.warning_score {
        if let Some((offset, point)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.score >= fc.warning_score)
        {
            warnings.push(format!(
                "risk score projected to cross {:.0} within {} days (reaching {:.1})",
                fc.warning_score,
                offset + 1,
                point.score
            ));
        }
    }

    let acceleration = predicted_velocity - velocity;
    if acceleration.abs() > fc.acceleration_warning {
        warnings.push(format!(
            "risk trend acceleration of {acceleration:+.1} points/week"
        ));
    }

    warnings
}
