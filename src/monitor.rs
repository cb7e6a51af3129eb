//! Radar monitoring cycle: one reflectivity sample per pump, alert
//! decision, persistence, and a run summary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::geo::Located;
use crate::location_code::location_code;
use crate::radar::{
    IntensityLabel, IntensityThresholds, RAIN_THRESHOLD_MM_PER_HOUR, RadarFrame, RadarProvider,
    rain_rate,
};
use crate::roster::{PumpLocation, PumpRoster};
use crate::store::{DocumentStore, collections, insert_records};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Alert when the rain rate reaches this many mm/h.
    pub threshold: f64,
    /// Persist every pump's sample, not only alerting ones.
    pub save_all: bool,
    /// Sampling window radius in pixels.
    pub radius: usize,
    /// Maximum RGB distance for a pixel to count as a legend color.
    pub max_color_distance: f64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            threshold: RAIN_THRESHOLD_MM_PER_HOUR,
            save_all: true,
            radius: 2,
            max_color_distance: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectivitySample {
    pub pump: PumpLocation,
    pub location_code: String,
    pub dbz: f64,
    pub rain_rate_mm_per_hour: f64,
    pub intensity_label: IntensityLabel,
    pub confidence: f64,
    pub captured_at: DateTime<Utc>,
    pub radar_station: String,
    pub should_alert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEntry {
    pub pump_name: String,
    pub location_code: String,
    pub lat: f64,
    pub lng: f64,
    pub dbz: f64,
    pub rain_rate_mm_per_hour: f64,
    pub intensity_label: IntensityLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSummary {
    pub started_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub radar_station: String,
    pub threshold: f64,
    pub total_checked: usize,
    pub alert_count: usize,
    pub decode_failures: usize,
    pub saved: usize,
    pub intensity_counts: BTreeMap<IntensityLabel, usize>,
    pub duration_ms: u64,
    pub alerts: Vec<AlertEntry>,
}

/// Samples decoded from one frame.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub samples: Vec<ReflectivitySample>,
    pub decode_failures: usize,
}

pub struct MonitorEngine {
    roster: Arc<PumpRoster>,
    store: Arc<dyn DocumentStore>,
    thresholds: IntensityThresholds,
}

impl MonitorEngine {
    pub fn new(
        roster: Arc<PumpRoster>,
        store: Arc<dyn DocumentStore>,
        thresholds: IntensityThresholds,
    ) -> Self {
        Self { roster, store, thresholds }
    }

    /// Decodes one sample per pump. A pump whose pixels cannot be read
    /// yields a zero-confidence `NoRain` sample and counts as a failure.
    pub fn evaluate(&self, frame: &RadarFrame, opts: &MonitorOptions) -> Evaluation {
        let mut eval = Evaluation::default();

        for pump in self.roster.pumps() {
            let (dbz, confidence) =
                match frame.sample(pump.position(), opts.radius, opts.max_color_distance) {
                    Ok(window) => (window.dbz, window.confidence()),
                    Err(e) => {
                        warn!(pump = %pump.name, error = %e, "Radar decode failed");
                        eval.decode_failures += 1;
                        (0.0, 0.0)
                    }
                };

            let rate = rain_rate(dbz);
            eval.samples.push(ReflectivitySample {
                pump: pump.clone(),
                location_code: location_code(&pump.name),
                dbz,
                rain_rate_mm_per_hour: rate,
                intensity_label: self.thresholds.classify(rate),
                confidence,
                captured_at: frame.captured_at,
                radar_station: frame.station.clone(),
                should_alert: rate >= opts.threshold,
            });
        }

        eval
    }

    /// Captures a frame, decodes it for every pump, persists the samples
    /// selected by `opts.save_all`, and records the run summary.
    #[tracing::instrument(skip_all, fields(threshold = opts.threshold, save_all = opts.save_all))]
    pub async fn run(&self, provider: &dyn RadarProvider, opts: &MonitorOptions) -> Result<MonitorSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let frame = provider.capture().await.context("radar frame unavailable")?;
        let eval = self.evaluate(&frame, opts);

        let to_save: Vec<&ReflectivitySample> = eval
            .samples
            .iter()
            .filter(|s| opts.save_all || s.should_alert)
            .collect();
        if !to_save.is_empty() {
            insert_records(self.store.as_ref(), collections::RADAR_SAMPLES, &to_save)
                .await
                .context("failed to store radar samples")?;
        }

        let summary = summarize(&frame, &eval, opts.threshold, to_save.len(), started_at, clock);
        insert_records(self.store.as_ref(), collections::MONITOR_RUNS, std::slice::from_ref(&summary))
            .await
            .context("failed to store monitor summary")?;

        info!(
            total_checked = summary.total_checked,
            alert_count = summary.alert_count,
            decode_failures = summary.decode_failures,
            saved = summary.saved,
            duration_ms = summary.duration_ms,
            "Monitor cycle complete"
        );
        Ok(summary)
    }
}

fn summarize(
    frame: &RadarFrame,
    eval: &Evaluation,
    threshold: f64,
    saved: usize,
    started_at: DateTime<Utc>,
    clock: Instant,
) -> MonitorSummary {
    let mut intensity_counts: BTreeMap<IntensityLabel, usize> =
        IntensityLabel::ALL.iter().map(|l| (*l, 0)).collect();
    for s in &eval.samples {
        *intensity_counts.entry(s.intensity_label).or_default() += 1;
    }

    let alerts: Vec<AlertEntry> = eval
        .samples
        .iter()
        .filter(|s| s.should_alert)
        .map(|s| AlertEntry {
            pump_name: s.pump.name.clone(),
            location_code: s.location_code.clone(),
            lat: s.pump.lat,
            lng: s.pump.lng,
            dbz: s.dbz,
            rain_rate_mm_per_hour: s.rain_rate_mm_per_hour,
            intensity_label: s.intensity_label,
            confidence: s.confidence,
        })
        .collect();

    MonitorSummary {
        started_at,
        captured_at: frame.captured_at,
        radar_station: frame.station.clone(),
        threshold,
        total_checked: eval.samples.len(),
        alert_count: alerts.len(),
        decode_failures: eval.decode_failures,
        saved,
        intensity_counts,
        duration_ms: clock.elapsed().as_millis() as u64,
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radar::{Bounds, ColorLegend, Rgb};
    use crate::store::{MemoryStore, Query};
    use async_trait::async_trait;

    struct FixedFrame(RadarFrame);

    #[async_trait]
    impl RadarProvider for FixedFrame {
        async fn capture(&self) -> Result<RadarFrame> {
            Ok(self.0.clone())
        }
    }

    /// 100x100 frame over lat [-7,-6], lng [106,107]: left half yellow
    /// (35 dBZ), right half background.
    fn frame() -> RadarFrame {
        let mut pixels = vec![Rgb(128, 128, 128); 100 * 100];
        for y in 0..100 {
            for x in 0..50 {
                pixels[y * 100 + x] = Rgb(255, 255, 0);
            }
        }
        RadarFrame::new(
            100,
            100,
            pixels,
            Bounds { lat_min: -7.0, lat_max: -6.0, lon_min: 106.0, lon_max: 107.0 },
            ColorLegend::standard(),
            "JAK",
            Utc::now(),
        )
    }

    fn setup() -> (MonitorEngine, Arc<MemoryStore>) {
        let roster = PumpRoster::new(vec![
            PumpLocation { name: "Wet".into(), lat: -6.5, lng: 106.2 },
            PumpLocation { name: "Dry".into(), lat: -6.5, lng: 106.8 },
            PumpLocation { name: "Outside".into(), lat: -5.0, lng: 106.5 },
        ])
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let engine = MonitorEngine::new(Arc::new(roster), store.clone(), IntensityThresholds::default());
        (engine, store)
    }

    #[test]
    fn test_evaluate_classifies_and_flags() {
        let (engine, _) = setup();
        let eval = engine.evaluate(&frame(), &MonitorOptions::default());

        assert_eq!(eval.samples.len(), 3);
        assert_eq!(eval.decode_failures, 1);

        let wet = &eval.samples[0];
        assert_eq!(wet.dbz, 35.0);
        assert_eq!(wet.intensity_label, IntensityLabel::Moderate);
        assert_eq!(wet.confidence, 1.0);
        assert!(wet.should_alert);

        let dry = &eval.samples[1];
        assert_eq!(dry.intensity_label, IntensityLabel::NoRain);
        assert!(!dry.should_alert);

        let outside = &eval.samples[2];
        assert_eq!(outside.confidence, 0.0);
        assert_eq!(outside.intensity_label, IntensityLabel::NoRain);
    }

    #[tokio::test]
    async fn test_save_all_vs_alerts_only() {
        let (engine, store) = setup();
        let provider = FixedFrame(frame());

        let all = engine.run(&provider, &MonitorOptions::default()).await.unwrap();
        assert_eq!(all.saved, 3);

        let opts = MonitorOptions { save_all: false, ..MonitorOptions::default() };
        let alerts_only = engine.run(&provider, &opts).await.unwrap();
        assert_eq!(alerts_only.saved, 1);
        assert_eq!(alerts_only.alert_count, 1);
        assert_eq!(alerts_only.alerts[0].pump_name, "Wet");
        assert_eq!(alerts_only.intensity_counts[&IntensityLabel::NoRain], 2);

        let stored = store.find(collections::RADAR_SAMPLES, &Query::new()).await.unwrap();
        assert_eq!(stored.len(), 4);
        let runs = store.find(collections::MONITOR_RUNS, &Query::new()).await.unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[tokio::test]
    async fn test_higher_threshold_suppresses_alert() {
        let (engine, _) = setup();
        let opts = MonitorOptions { threshold: 10.0, ..MonitorOptions::default() };
        let summary = engine.run(&FixedFrame(frame()), &opts).await.unwrap();
        assert_eq!(summary.alert_count, 0);
    }
}
