use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::grade::grade;
use super::utility::{mean, pearson, ratio};
use super::{AccuracyEngine, ForecastVerification};
use crate::store::{Filter, Order, Query, collections, find_as, insert_records};

/// 2×2 rain / no-rain table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contingency {
    pub hits: usize,
    pub misses: usize,
    pub false_alarms: usize,
    pub correct_negatives: usize,
}

impl Contingency {
    pub fn record(&mut self, predicted_rain: bool, actual_rain: bool) {
        match (predicted_rain, actual_rain) {
            (true, true) => self.hits += 1,
            (false, true) => self.misses += 1,
            (true, false) => self.false_alarms += 1,
            (false, false) => self.correct_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.hits + self.misses + self.false_alarms + self.correct_negatives
    }

    pub fn accuracy(&self) -> Option<f64> {
        ratio((self.hits + self.correct_negatives) as f64, self.total() as f64)
    }

    pub fn precision(&self) -> Option<f64> {
        ratio(self.hits as f64, (self.hits + self.false_alarms) as f64)
    }

    pub fn recall(&self) -> Option<f64> {
        ratio(self.hits as f64, (self.hits + self.misses) as f64)
    }

    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision()?, self.recall()?);
        ratio(2.0 * p * r, p + r)
    }
}

/// Forecast skill for one location over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyMetrics {
    pub location: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub sample_count: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Mean of predicted − actual; positive means over-forecasting.
    pub bias: f64,
    pub correlation: Option<f64>,
    /// Only over pairs whose forecast carried a probability.
    pub brier_score: Option<f64>,
    pub contingency: Contingency,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    /// Letter grade on F1, or on accuracy when F1 is undefined.
    pub grade: String,
    pub threshold: f64,
    pub computed_at: DateTime<Utc>,
}

/// Scores verified pairs. `None` when there are none.
pub fn score(
    location: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pairs: &[ForecastVerification],
    threshold: f64,
) -> Option<AccuracyMetrics> {
    let predicted: Vec<f64> = pairs.iter().map(|p| p.predicted).collect();
    let actual: Vec<f64> = pairs.iter().map(|p| p.actual).collect();
    let errors: Vec<f64> = predicted.iter().zip(&actual).map(|(p, a)| p - a).collect();

    let bias = mean(&errors)?;
    let mae = mean(&errors.iter().map(|e| e.abs()).collect::<Vec<_>>())?;
    let rmse = mean(&errors.iter().map(|e| e * e).collect::<Vec<_>>())?.sqrt();

    let brier: Vec<f64> = pairs
        .iter()
        .filter_map(|p| {
            let prob = (p.probability? / 100.0).clamp(0.0, 1.0);
            let outcome = if p.actual >= threshold { 1.0 } else { 0.0 };
            Some((prob - outcome).powi(2))
        })
        .collect();

    let mut contingency = Contingency::default();
    for p in pairs {
        contingency.record(p.predicted >= threshold, p.actual >= threshold);
    }

    let accuracy = contingency.accuracy();
    let f1 = contingency.f1();
    let skill = f1.or(accuracy).unwrap_or(0.0);

    Some(AccuracyMetrics {
        location: location.to_string(),
        period_start: start,
        period_end: end,
        sample_count: pairs.len(),
        mae,
        rmse,
        bias,
        correlation: pearson(&predicted, &actual),
        brier_score: mean(&brier),
        contingency,
        accuracy,
        precision: contingency.precision(),
        recall: contingency.recall(),
        f1,
        grade: grade(skill).to_string(),
        threshold,
        computed_at: Utc::now(),
    })
}

impl AccuracyEngine {
    /// Computes metrics for `location` over verified forecasts whose target
    /// time is in `[start, end)` and appends them to the accuracy history.
    #[tracing::instrument(skip(self))]
    pub async fn calculate_metrics(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<AccuracyMetrics>> {
        let pairs: Vec<ForecastVerification> = find_as(
            self.store.as_ref(),
            collections::FORECAST_VERIFICATIONS,
            &Query::new()
                .eq("locationName", location)
                .range("targetTime", start.to_rfc3339(), end.to_rfc3339()),
        )
        .await
        .context("failed to read verifications")?;

        let Some(metrics) = score(location, start, end, &pairs, self.config.rain_threshold) else {
            debug!("No verified forecasts in period");
            return Ok(None);
        };

        match insert_records(self.store.as_ref(), collections::ACCURACY_HISTORY, std::slice::from_ref(&metrics)).await
        {
            Ok(_) => {
                if let Err(e) = self.prune_history(location).await {
                    warn!(error = %e, "Failed to prune accuracy history");
                }
            }
            Err(e) => warn!(error = %e, "Failed to append accuracy history"),
        }
        Ok(Some(metrics))
    }

    /// Drops history for `location` beyond the newest `history_retention`
    /// entries.
    async fn prune_history(&self, location: &str) -> Result<usize> {
        let newest = self
            .store
            .find(
                collections::ACCURACY_HISTORY,
                &Query::new()
                    .eq("location", location)
                    .sort("computedAt", Order::Desc)
                    .project(&["computedAt"]),
            )
            .await?;
        let Some(cutoff) = newest
            .get(self.config.history_retention)
            .and_then(|d| d.get("computedAt"))
            .cloned()
        else {
            return Ok(0);
        };

        let removed = self
            .store
            .delete_many(
                collections::ACCURACY_HISTORY,
                &Query::new()
                    .eq("location", location)
                    .filter(Filter::Lte("computedAt".to_string(), cutoff)),
            )
            .await?;
        debug!(removed, "Pruned accuracy history");
        Ok(removed)
    }

    /// Most recent metrics for `location`, newest first.
    pub async fn metrics_history(&self, location: &str, limit: Option<usize>) -> Result<Vec<AccuracyMetrics>> {
        let limit = limit.unwrap_or(self.config.history_limit);
        let history = find_as(
            self.store.as_ref(),
            collections::ACCURACY_HISTORY,
            &Query::new()
                .eq("location", location)
                .sort("computedAt", Order::Desc)
                .limit(limit),
        )
        .await
        .context("failed to read accuracy history")?;
        Ok(history)
    }
}
