//! Third-party hourly forecasts for every pump location.

pub mod collector;
pub mod provider;

pub use collector::{ForecastCollector, ForecastReport};
pub use provider::{ForecastProvider, HourlyForecast, OpenMeteoProvider};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One forecast hour for one location. Written once per forecast run and
/// never modified; verification outcomes live in companion records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub id: String,
    pub location_name: String,
    pub location_code: String,
    pub lat: f64,
    pub lng: f64,
    pub target_time: DateTime<Utc>,
    /// Precipitation in mm over the hour, read as mm/h.
    pub precipitation: f64,
    pub rain: Option<f64>,
    pub temperature: Option<f64>,
    /// Probability of precipitation, percent.
    pub probability: Option<f64>,
    pub weather_code: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

impl ForecastPoint {
    pub fn make_id(location_code: &str, target_time: DateTime<Utc>, fetched_at: DateTime<Utc>) -> String {
        format!(
            "{location_code}:{}:{}",
            target_time.timestamp(),
            fetched_at.timestamp_millis()
        )
    }
}
