//! Nearest-station fusion of sensor feeds onto the pump roster.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::feed::SensorFeed;
use super::{FeedKind, FusedRecord, SensorObservation};
use crate::geo::{Located, nearest};
use crate::location_code::location_code;
use crate::roster::PumpRoster;
use crate::store::{DocumentStore, insert_records};

/// Pure result of joining one feed against the roster.
#[derive(Debug, Default)]
pub struct Fusion {
    pub records: Vec<FusedRecord>,
    /// Pumps with no valid station this cycle.
    pub coverage_gaps: Vec<String>,
}

/// Per-feed outcome of one cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedReport {
    pub feed: FeedKind,
    pub observations: usize,
    pub malformed: usize,
    pub fused: usize,
    pub coverage_gaps: Vec<String>,
    pub stored: bool,
    pub error: Option<String>,
}

impl FeedReport {
    fn failed(feed: FeedKind, error: String) -> Self {
        Self {
            feed,
            observations: 0,
            malformed: 0,
            fused: 0,
            coverage_gaps: Vec::new(),
            stored: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionReport {
    pub fetched_at: DateTime<Utc>,
    pub rainfall: FeedReport,
    pub water_level: FeedReport,
    pub duration_ms: u64,
}

impl FusionReport {
    pub fn is_success(&self) -> bool {
        self.rainfall.error.is_none() && self.water_level.error.is_none()
    }

    pub fn errors(&self) -> Vec<String> {
        [&self.rainfall, &self.water_level]
            .into_iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.feed)))
            .collect()
    }
}

pub struct SensorFusionEngine {
    roster: Arc<PumpRoster>,
    store: Arc<dyn DocumentStore>,
}

impl SensorFusionEngine {
    pub fn new(roster: Arc<PumpRoster>, store: Arc<dyn DocumentStore>) -> Self {
        Self { roster, store }
    }

    /// Matches every pump to its nearest valid observation.
    pub fn fuse(&self, observations: &[SensorObservation], fetched_at: DateTime<Utc>) -> Fusion {
        let mut fusion = Fusion::default();

        for pump in self.roster.pumps() {
            match nearest(pump.position(), observations) {
                Some((obs, distance_km)) => fusion.records.push(FusedRecord {
                    pump_name: pump.name.clone(),
                    location_code: location_code(&pump.name),
                    lat: pump.lat,
                    lng: pump.lng,
                    nearest_station_name: obs.station_name.clone(),
                    distance_km,
                    value: obs.value,
                    status_label: obs.status_label.clone(),
                    fetched_at,
                    source_observed_at: obs.observed_at,
                }),
                None => fusion.coverage_gaps.push(pump.name.clone()),
            }
        }

        fusion
    }

    /// Fetches both feeds concurrently, fuses each, and bulk-inserts each
    /// feed's batch independently.
    #[tracing::instrument(skip_all)]
    pub async fn run_cycle(&self, rainfall: &dyn SensorFeed, water_level: &dyn SensorFeed) -> FusionReport {
        let started = Instant::now();
        let fetched_at = Utc::now();

        let (rainfall, water_level) = tokio::join!(
            self.run_feed(rainfall, fetched_at),
            self.run_feed(water_level, fetched_at),
        );

        let report = FusionReport {
            fetched_at,
            rainfall,
            water_level,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            rainfall_fused = report.rainfall.fused,
            water_level_fused = report.water_level.fused,
            duration_ms = report.duration_ms,
            success = report.is_success(),
            "Sensor fusion cycle complete"
        );
        report
    }

    async fn run_feed(&self, feed: &dyn SensorFeed, fetched_at: DateTime<Utc>) -> FeedReport {
        let kind = feed.kind();

        let parsed = match feed.fetch().await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(feed = %kind, error = %e, "Sensor feed unavailable");
                return FeedReport::failed(kind, format!("{e:#}"));
            }
        };

        if parsed.malformed > 0 {
            warn!(feed = %kind, malformed = parsed.malformed, "Skipped malformed station records");
        }

        let fusion = self.fuse(&parsed.observations, fetched_at);
        if !fusion.coverage_gaps.is_empty() {
            warn!(feed = %kind, pumps = ?fusion.coverage_gaps, "Coverage gap: no valid station");
        }

        let mut report = FeedReport {
            feed: kind,
            observations: parsed.observations.len(),
            malformed: parsed.malformed,
            fused: fusion.records.len(),
            coverage_gaps: fusion.coverage_gaps,
            stored: false,
            error: None,
        };

        if fusion.records.is_empty() {
            return report;
        }

        match insert_records(self.store.as_ref(), kind.collection(), &fusion.records).await {
            Ok(_) => report.stored = true,
            Err(e) => {
                error!(feed = %kind, error = %e, "Failed to store fused records");
                report.error = Some(format!("store: {e}"));
            }
        }
        report
    }
}
