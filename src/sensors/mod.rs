//! Government sensor feeds (rainfall depth, water level) and their fusion
//! onto the pump roster.

pub mod feed;
pub mod fusion;
pub mod normalize;

pub use feed::{HttpSensorFeed, SensorFeed};
pub use fusion::{FeedReport, FusionReport, SensorFusionEngine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Located};
use crate::store::collections;

/// The two independent sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Rainfall,
    WaterLevel,
}

impl FeedKind {
    pub fn collection(&self) -> &'static str {
        match self {
            FeedKind::Rainfall => collections::RAINFALL_RECORDS,
            FeedKind::WaterLevel => collections::WATER_LEVEL_RECORDS,
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Rainfall => write!(f, "rainfall"),
            FeedKind::WaterLevel => write!(f, "water_level"),
        }
    }
}

/// One normalized station reading from either feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorObservation {
    pub station_name: String,
    pub lat: f64,
    pub lng: f64,
    pub value: f64,
    pub status_label: String,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Located for SensorObservation {
    fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A pump's reading for one feed and one fetch cycle, taken from the
/// nearest valid station. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedRecord {
    pub pump_name: String,
    pub location_code: String,
    pub lat: f64,
    pub lng: f64,
    pub nearest_station_name: String,
    pub distance_km: f64,
    pub value: f64,
    pub status_label: String,
    pub fetched_at: DateTime<Utc>,
    pub source_observed_at: Option<DateTime<Utc>>,
}
