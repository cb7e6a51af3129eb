//! Forecast verification and accuracy scoring.
//!
//! [`AccuracyEngine::verify`] pairs stored forecast points with the nearest
//! real observation in time and appends companion
//! [`ForecastVerification`] records. [`AccuracyEngine::calculate_metrics`]
//! aggregates those pairs into [`AccuracyMetrics`]. Nothing here writes
//! sensor data, and metrics can always be regenerated from the store.

pub mod grade;
pub mod metrics;
pub mod utility;
pub mod verify;

pub use metrics::{AccuracyMetrics, Contingency};
pub use verify::{ForecastVerification, VerifyReport};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::radar::RAIN_THRESHOLD_MM_PER_HOUR;
use crate::store::{DocumentStore, Query, collections};

/// Gauge readings are fetched some time after they are observed. Reads of
/// fused records widen the `fetchedAt` window by this many hours.
const MAX_FETCH_LAG_HOURS: i64 = 6;

/// Where the "actual" side of a forecast/observation pair comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualSource {
    /// Radar-derived rain rate per pump (mm/h).
    Radar,
    /// Fused rain-gauge readings per pump.
    #[default]
    RainGauge,
}

impl ActualSource {
    pub(crate) fn collection(&self) -> &'static str {
        match self {
            ActualSource::Radar => collections::RADAR_SAMPLES,
            ActualSource::RainGauge => collections::RAINFALL_RECORDS,
        }
    }

    pub(crate) fn location_field(&self) -> &'static str {
        match self {
            ActualSource::Radar => "pump.name",
            ActualSource::RainGauge => "pumpName",
        }
    }

    /// Time fields in priority order.
    pub(crate) fn time_fields(&self) -> &'static [&'static str] {
        match self {
            ActualSource::Radar => &["capturedAt"],
            ActualSource::RainGauge => &["sourceObservedAt", "fetchedAt"],
        }
    }

    /// Store-side filter narrowing reads to documents that can carry an
    /// observation time in `[from, to)`. Exact times are checked after
    /// reading.
    pub(crate) fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Query {
        match self {
            ActualSource::Radar => Query::new().range("capturedAt", from.to_rfc3339(), to.to_rfc3339()),
            // An observation never postdates its fetch.
            ActualSource::RainGauge => {
                let until = to + Duration::hours(MAX_FETCH_LAG_HOURS);
                Query::new().range("fetchedAt", from.to_rfc3339(), until.to_rfc3339())
            }
        }
    }

    pub(crate) fn value_field(&self) -> &'static str {
        match self {
            ActualSource::Radar => "rainRateMmPerHour",
            ActualSource::RainGauge => "value",
        }
    }
}

impl std::str::FromStr for ActualSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "radar" => Ok(ActualSource::Radar),
            "rain_gauge" | "raingauge" | "gauge" => Ok(ActualSource::RainGauge),
            other => Err(format!("unknown actual source '{other}' (expected radar or rain_gauge)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyConfig {
    /// Maximum |forecast target − observation time| for a match.
    pub tolerance: Duration,
    /// Rain / no-rain boundary in mm/h.
    pub rain_threshold: f64,
    pub source: ActualSource,
    /// Entries returned by [`AccuracyEngine::metrics_history`] by default.
    pub history_limit: usize,
    /// Entries kept per location; older ones are pruned on append.
    pub history_retention: usize,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            tolerance: Duration::minutes(5),
            rain_threshold: RAIN_THRESHOLD_MM_PER_HOUR,
            source: ActualSource::default(),
            history_limit: 30,
            history_retention: 500,
        }
    }
}

pub struct AccuracyEngine {
    store: Arc<dyn DocumentStore>,
    config: AccuracyConfig,
}

impl AccuracyEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: AccuracyConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AccuracyConfig {
        &self.config
    }
}
