use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{error, info};

use super::{AccuracyEngine, ActualSource};
use crate::forecast::ForecastPoint;
use crate::sensors::normalize::parse_number;
use crate::store::{Query, collections, find_as, insert_records, query};

/// Write-once companion to a [`ForecastPoint`] recording what actually
/// happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastVerification {
    pub forecast_id: String,
    pub location_name: String,
    pub target_time: DateTime<Utc>,
    pub predicted: f64,
    pub probability: Option<f64>,
    pub actual: f64,
    pub actual_time: DateTime<Utc>,
    /// Observation time minus target time.
    pub time_delta_seconds: i64,
    pub source: ActualSource,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// Unverified points considered in the window.
    pub candidates: usize,
    pub verified: usize,
    /// No observation within tolerance; left unverified for a later pass.
    pub unmatched: usize,
    /// Matched but not stored because the store rejected the batch.
    pub failed: usize,
}

/// One observation usable as ground truth.
#[derive(Debug, Clone, Copy)]
struct Actual {
    at: DateTime<Utc>,
    value: f64,
}

impl AccuracyEngine {
    /// Verifies every not-yet-verified forecast point whose target time lies
    /// in `[start, end)`.
    #[tracing::instrument(skip(self), fields(source = ?self.config.source))]
    pub async fn verify(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<VerifyReport> {
        let store = self.store.as_ref();
        let tol = self.config.tolerance;

        let forecasts: Vec<ForecastPoint> = find_as(
            store,
            collections::FORECASTS,
            &Query::new().range("targetTime", start.to_rfc3339(), end.to_rfc3339()),
        )
        .await
        .context("failed to read forecast points")?;

        let done: HashSet<String> = store
            .distinct(collections::FORECAST_VERIFICATIONS, "forecastId")
            .await
            .context("failed to read verification ids")?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let pending: Vec<&ForecastPoint> = forecasts.iter().filter(|f| !done.contains(&f.id)).collect();

        let actuals = self
            .load_actuals(start - tol, end + tol)
            .await
            .context("failed to read observations")?;

        let verified_at = Utc::now();
        let mut report = VerifyReport { candidates: pending.len(), ..VerifyReport::default() };
        let mut outcomes = Vec::new();

        for f in pending {
            let matched = actuals
                .get(&f.location_name)
                .and_then(|series| closest_in_time(series, f.target_time, tol));

            match matched {
                Some(actual) => outcomes.push(ForecastVerification {
                    forecast_id: f.id.clone(),
                    location_name: f.location_name.clone(),
                    target_time: f.target_time,
                    predicted: f.precipitation,
                    probability: f.probability,
                    actual: actual.value,
                    actual_time: actual.at,
                    time_delta_seconds: (actual.at - f.target_time).num_seconds(),
                    source: self.config.source,
                    verified_at,
                }),
                None => report.unmatched += 1,
            }
        }

        if !outcomes.is_empty() {
            match insert_records(store, collections::FORECAST_VERIFICATIONS, &outcomes).await {
                Ok(n) => report.verified = n,
                Err(e) => {
                    error!(error = %e, count = outcomes.len(), "Failed to store verifications");
                    report.failed = outcomes.len();
                }
            }
        }

        info!(
            candidates = report.candidates,
            verified = report.verified,
            unmatched = report.unmatched,
            failed = report.failed,
            "Verification pass complete"
        );
        Ok(report)
    }

    /// Observations in `[from, to)` grouped by pump name.
    async fn load_actuals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Actual>>> {
        let source = self.config.source;
        let docs = self.store.find(source.collection(), &source.window(from, to)).await?;

        let mut by_location: HashMap<String, Vec<Actual>> = HashMap::new();
        for doc in &docs {
            let Some(actual) = read_actual(doc, source) else {
                continue;
            };
            if actual.at < from || actual.at >= to {
                continue;
            }
            if let Some(name) = query::field(doc, source.location_field()).and_then(Value::as_str) {
                by_location.entry(name.to_string()).or_default().push(actual);
            }
        }
        Ok(by_location)
    }
}

fn read_actual(doc: &Value, source: ActualSource) -> Option<Actual> {
    let at = source.time_fields().iter().find_map(|f| {
        query::field(doc, f)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    })?;
    let value = query::field(doc, source.value_field()).and_then(parse_number)?;
    Some(Actual { at: at.with_timezone(&Utc), value })
}

/// Observation nearest to `target` within `tol`; earliest in input order on ties.
fn closest_in_time(series: &[Actual], target: DateTime<Utc>, tol: Duration) -> Option<Actual> {
    let mut best: Option<(Actual, Duration)> = None;
    for a in series {
        let delta = (a.at - target).abs();
        if delta > tol {
            continue;
        }
        match best {
            Some((_, d)) if delta >= d => {}
            _ => best = Some((*a, delta)),
        }
    }
    best.map(|(a, _)| a)
}
