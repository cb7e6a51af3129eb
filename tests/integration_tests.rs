use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{ImageFormat, RgbImage};
use pumpwatch::accuracy::{AccuracyConfig, AccuracyEngine, ActualSource};
use pumpwatch::forecast::{ForecastCollector, ForecastProvider, HourlyForecast};
use pumpwatch::geo::GeoPoint;
use pumpwatch::monitor::{MonitorEngine, MonitorOptions};
use pumpwatch::radar::{Bounds, ColorLegend, IntensityLabel, IntensityThresholds, RadarFrame, RadarProvider};
use pumpwatch::roster::{PumpLocation, PumpRoster};
use pumpwatch::sensors::normalize::{ParsedFeed, parse_observations};
use pumpwatch::sensors::{FeedKind, SensorFeed, SensorFusionEngine};
use pumpwatch::store::{DocumentStore, JsonlStore, MemoryStore, Query, collections};
use pumpwatch::views::latest_fused;
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;

/// Feed that parses a canned JSON payload exactly as the HTTP feed would.
struct PayloadFeed {
    kind: FeedKind,
    payload: Value,
}

#[async_trait]
impl SensorFeed for PayloadFeed {
    fn kind(&self) -> FeedKind {
        self.kind
    }

    async fn fetch(&self) -> Result<ParsedFeed> {
        let tz = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        Ok(parse_observations(&self.payload, self.kind.schema(), tz))
    }
}

fn single_pump_roster() -> Arc<PumpRoster> {
    Arc::new(PumpRoster::new(vec![PumpLocation { name: "A".into(), lat: -6.20, lng: 106.80 }]).unwrap())
}

#[tokio::test]
async fn test_end_to_end_fusion() {
    let store = Arc::new(MemoryStore::new());
    let engine = SensorFusionEngine::new(single_pump_roster(), store.clone());

    let rainfall = PayloadFeed {
        kind: FeedKind::Rainfall,
        payload: json!([{"nama": "Sta1", "lat": -6.201, "lng": 106.801, "val": "2,5"}]),
    };
    let water_level = PayloadFeed {
        kind: FeedKind::WaterLevel,
        payload: json!({"data": [{"NAMA_POS": "Pos Manggarai", "LATITUDE": "-6,2087", "LONGITUDE": "106,8497", "TMA": "850"}]}),
    };

    let report = engine.run_cycle(&rainfall, &water_level).await;
    assert!(report.is_success());

    let latest = latest_fused(&*store, FeedKind::Rainfall).await.unwrap();
    assert_eq!(latest.len(), 1);
    let a = &latest[0];
    assert_eq!(a.pump_name, "A");
    assert_eq!(a.value, 2.5);
    assert_eq!(a.nearest_station_name, "Sta1");
    assert!((a.distance_km - 0.157).abs() < 0.001, "distance {}", a.distance_km);

    let water = latest_fused(&*store, FeedKind::WaterLevel).await.unwrap();
    assert_eq!(water[0].value, 850.0);
    assert_eq!(water[0].nearest_station_name, "Pos Manggarai");
}

#[tokio::test]
async fn test_fusion_reruns_append_and_latest_wins() {
    let store = Arc::new(MemoryStore::new());
    let engine = SensorFusionEngine::new(single_pump_roster(), store.clone());
    let empty = PayloadFeed { kind: FeedKind::WaterLevel, payload: json!([]) };

    for val in ["1,0", "4,5"] {
        let rainfall = PayloadFeed {
            kind: FeedKind::Rainfall,
            payload: json!([{"nama": "Sta1", "lat": -6.201, "lng": 106.801, "val": val}]),
        };
        let report = engine.run_cycle(&rainfall, &empty).await;
        assert_eq!(report.water_level.coverage_gaps, vec!["A".to_string()]);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let all = store.find(collections::RAINFALL_RECORDS, &Query::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    let latest = latest_fused(&*store, FeedKind::Rainfall).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].value, 4.5);
}

/// PNG-encoded frame served from memory.
struct PngRadar {
    png: Vec<u8>,
    bounds: Bounds,
}

#[async_trait]
impl RadarProvider for PngRadar {
    async fn capture(&self) -> Result<RadarFrame> {
        RadarFrame::from_image_bytes(&self.png, self.bounds, ColorLegend::standard(), "JAK", Utc::now())
    }
}

#[tokio::test]
async fn test_radar_png_to_summary() {
    // 35 dBZ yellow everywhere.
    let img = RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 0]));
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

    let store = Arc::new(MemoryStore::new());
    let engine = MonitorEngine::new(single_pump_roster(), store.clone(), IntensityThresholds::default());
    let provider = PngRadar {
        png,
        bounds: Bounds { lat_min: -6.5, lat_max: -6.0, lon_min: 106.5, lon_max: 107.0 },
    };

    let summary = engine.run(&provider, &MonitorOptions::default()).await.unwrap();

    assert_eq!(summary.total_checked, 1);
    assert_eq!(summary.alert_count, 1);
    assert_eq!(summary.intensity_counts[&IntensityLabel::Moderate], 1);
    let alert = &summary.alerts[0];
    assert!((alert.rain_rate_mm_per_hour - 5.62).abs() < 0.01);
    assert_eq!(alert.confidence, 1.0);

    let stored = store.find(collections::RADAR_SAMPLES, &Query::new()).await.unwrap();
    assert_eq!(stored[0]["pump"]["name"], "A");
    assert_eq!(stored[0]["intensityLabel"], "Moderate");
}

/// Forecast that always predicts `mm` for the next two hours from `t0`.
struct FlatForecast {
    t0: DateTime<Utc>,
    mm: f64,
}

#[async_trait]
impl ForecastProvider for FlatForecast {
    async fn hourly(&self, _at: GeoPoint) -> Result<HourlyForecast> {
        Ok(HourlyForecast {
            time: vec![self.t0, self.t0 + Duration::hours(1)],
            temperature: vec![Some(28.0); 2],
            rain: vec![Some(self.mm); 2],
            precipitation: vec![Some(self.mm); 2],
            probability: vec![Some(80.0); 2],
            weather_code: vec![Some(63); 2],
        })
    }
}

#[tokio::test]
async fn test_forecast_verify_metrics_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(JsonlStore::open(dir.path()).await.unwrap());
    let roster = single_pump_roster();
    let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap();

    let collector = ForecastCollector::new(roster.clone(), store.clone(), 2, std::time::Duration::ZERO);
    let report = collector.run(Arc::new(FlatForecast { t0, mm: 6.0 })).await.unwrap();
    assert_eq!(report.points_stored, 2);

    // Radar saw exactly the forecast rate, a couple of minutes off each hour.
    let observations: Vec<Value> = [2, -3]
        .iter()
        .enumerate()
        .map(|(h, offset)| {
            let at = t0 + Duration::hours(h as i64) + Duration::minutes(*offset);
            json!({"pump": {"name": "A"}, "capturedAt": at.to_rfc3339(), "rainRateMmPerHour": 6.0})
        })
        .collect();
    store.insert_many(collections::RADAR_SAMPLES, observations).await.unwrap();

    let config = AccuracyConfig { source: ActualSource::Radar, ..AccuracyConfig::default() };
    let engine = AccuracyEngine::new(store.clone(), config);
    let verified = engine.verify(t0, t0 + Duration::hours(2)).await.unwrap();
    assert_eq!(verified.verified, 2);
    assert_eq!(verified.unmatched, 0);

    let metrics = engine
        .calculate_metrics("A", t0, t0 + Duration::hours(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metrics.sample_count, 2);
    assert_eq!(metrics.mae, 0.0);
    assert_eq!(metrics.rmse, 0.0);
    assert_eq!(metrics.bias, 0.0);
    assert_eq!(metrics.correlation, None);
    assert_eq!(metrics.contingency.hits, 2);
    assert!((metrics.brier_score.unwrap() - 0.04).abs() < 1e-9);

    // A store reopened from disk sees the same history.
    let reopened = JsonlStore::open(dir.path()).await.unwrap();
    let history = reopened.find(collections::ACCURACY_HISTORY, &Query::new()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(
        engine
            .calculate_metrics("A", t0 + Duration::days(1), t0 + Duration::days(2))
            .await
            .unwrap()
            .is_none()
    );
}
