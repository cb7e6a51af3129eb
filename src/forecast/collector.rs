use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info};

use super::ForecastPoint;
use super::provider::{ForecastProvider, HourlyForecast};
use crate::geo::Located;
use crate::location_code::location_code;
use crate::roster::{PumpLocation, PumpRoster};
use crate::store::{DocumentStore, collections, insert_records};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastReport {
    pub fetched_at: DateTime<Utc>,
    pub locations: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
    pub points_stored: usize,
    pub duration_ms: u64,
}

/// Pulls hourly forecasts for every pump through a bounded worker pool and
/// stores all points from one run as a single batch.
pub struct ForecastCollector {
    roster: Arc<PumpRoster>,
    store: Arc<dyn DocumentStore>,
    concurrency: usize,
    request_delay: Duration,
}

impl ForecastCollector {
    pub fn new(
        roster: Arc<PumpRoster>,
        store: Arc<dyn DocumentStore>,
        concurrency: usize,
        request_delay: Duration,
    ) -> Self {
        Self {
            roster,
            store,
            concurrency: concurrency.max(1),
            request_delay,
        }
    }

    #[tracing::instrument(skip_all, fields(concurrency = self.concurrency))]
    pub async fn run(&self, provider: Arc<dyn ForecastProvider>) -> Result<ForecastReport> {
        let started = Instant::now();
        let fetched_at = Utc::now();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));

        let mut tasks = Vec::with_capacity(self.roster.len());
        for pump in self.roster.pumps() {
            let sem = semaphore.clone();
            let provider = provider.clone();
            let pump = pump.clone();
            let delay = self.request_delay;
            let span = tracing::info_span!("forecast_location", pump = %pump.name);

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await?;
                    let result = provider.hourly(pump.position()).await;
                    // Hold the permit through the delay so the cap also
                    // bounds the request rate.
                    tokio::time::sleep(delay).await;
                    anyhow::Ok((pump, result))
                }
                .instrument(span),
            ));
        }

        let mut points = Vec::new();
        let mut succeeded = 0;
        let mut failed = Vec::new();

        for task in tasks {
            match task.await {
                Ok(Ok((pump, Ok(hourly)))) => {
                    let mut p = to_points(&pump, &hourly, fetched_at);
                    debug!(pump = %pump.name, points = p.len(), "Forecast received");
                    points.append(&mut p);
                    succeeded += 1;
                }
                Ok(Ok((pump, Err(e)))) => {
                    error!(pump = %pump.name, error = %e, "Forecast fetch failed");
                    failed.push(pump.name);
                }
                Ok(Err(e)) => error!(error = %e, "Forecast worker could not start"),
                Err(e) => error!(error = %e, "Forecast worker panicked"),
            }
        }

        if succeeded == 0 && !self.roster.is_empty() {
            bail!("forecast provider unavailable for all {} locations", self.roster.len());
        }

        if !points.is_empty() {
            insert_records(self.store.as_ref(), collections::FORECASTS, &points)
                .await
                .context("failed to store forecast points")?;
        }

        let report = ForecastReport {
            fetched_at,
            locations: self.roster.len(),
            succeeded,
            failed,
            points_stored: points.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            points = report.points_stored,
            "Forecast run complete"
        );
        Ok(report)
    }
}

/// Hours without a precipitation value are dropped.
fn to_points(pump: &PumpLocation, h: &HourlyForecast, fetched_at: DateTime<Utc>) -> Vec<ForecastPoint> {
    let code = location_code(&pump.name);
    h.time
        .iter()
        .enumerate()
        .filter_map(|(i, &target_time)| {
            let precipitation = h.precipitation.get(i).copied().flatten()?;
            Some(ForecastPoint {
                id: ForecastPoint::make_id(&code, target_time, fetched_at),
                location_name: pump.name.clone(),
                location_code: code.clone(),
                lat: pump.lat,
                lng: pump.lng,
                target_time,
                precipitation,
                rain: h.rain.get(i).copied().flatten(),
                temperature: h.temperature.get(i).copied().flatten(),
                probability: h.probability.get(i).copied().flatten(),
                weather_code: h.weather_code.get(i).copied().flatten(),
                fetched_at,
            })
        })
        .collect()
}
