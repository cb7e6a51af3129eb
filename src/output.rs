//! Console and CSV output for CLI commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::monitor::ReflectivitySample;
use crate::radar::IntensityLabel;

/// Writes `value` as pretty JSON to stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Flat CSV row for one radar sample.
#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    captured_at: DateTime<Utc>,
    pump_name: &'a str,
    location_code: &'a str,
    lat: f64,
    lng: f64,
    dbz: f64,
    rain_rate_mm_per_hour: f64,
    intensity_label: IntensityLabel,
    confidence: f64,
    radar_station: &'a str,
    should_alert: bool,
}

impl<'a> From<&'a ReflectivitySample> for HistoryRow<'a> {
    fn from(s: &'a ReflectivitySample) -> Self {
        Self {
            captured_at: s.captured_at,
            pump_name: &s.pump.name,
            location_code: &s.location_code,
            lat: s.pump.lat,
            lng: s.pump.lng,
            dbz: s.dbz,
            rain_rate_mm_per_hour: s.rain_rate_mm_per_hour,
            intensity_label: s.intensity_label,
            confidence: s.confidence,
            radar_station: &s.radar_station,
            should_alert: s.should_alert,
        }
    }
}

/// Appends radar samples to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_history(path: &Path, samples: &[ReflectivitySample]) -> Result<usize> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = samples.len(), "Appending CSV history");

    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for s in samples {
        writer.serialize(HistoryRow::from(s))?;
    }
    writer.flush()?;

    Ok(samples.len())
}
