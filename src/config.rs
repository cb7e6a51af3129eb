//! Runtime configuration from environment variables (`.env` is loaded by
//! the binary before this is read).

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::accuracy::{AccuracyConfig, ActualSource};
use crate::monitor::MonitorOptions;
use crate::radar::{IntensityThresholds, MAX_SAMPLE_RADIUS, RAIN_THRESHOLD_MM_PER_HOUR};

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_STORE_DIR: &str = "data";

/// Where snapshots go after each cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishTarget {
    Disabled,
    Local(PathBuf),
    S3 { bucket: String, prefix: String, gzip: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedules {
    pub sensors: String,
    pub monitor: String,
    pub forecast: String,
    pub verify: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rainfall_url: Option<String>,
    pub water_level_url: Option<String>,
    /// Header and key sent to the government feed gateway, if it wants one.
    pub feed_api_key: Option<(String, String)>,
    /// Zone the feeds publish naive timestamps in.
    pub feed_timezone: FixedOffset,
    pub radar_meta_url: Option<String>,
    pub radar_station: String,
    pub forecast_url: String,
    pub forecast_days: u8,
    pub forecast_concurrency: usize,
    pub forecast_request_delay: Duration,
    pub roster_path: Option<String>,
    pub store_dir: PathBuf,
    pub publish: PublishTarget,
    pub schedules: Schedules,
    pub monitor: MonitorOptions,
    pub intensity: IntensityThresholds,
    pub accuracy: AccuracyConfig,
    /// How far back each scheduled verification pass looks.
    pub verify_lookback: Duration,
    pub http_timeout: Duration,
    pub job_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse = |key: &str| -> Result<Option<f64>> { parse_opt(key, get(key)) };

        let tz_hours: f64 = parse("FEED_TZ_OFFSET_HOURS")?.unwrap_or(7.0);
        let feed_timezone = FixedOffset::east_opt((tz_hours * 3600.0).round() as i32)
            .with_context(|| format!("FEED_TZ_OFFSET_HOURS out of range: {tz_hours}"))?;

        let feed_api_key = get("FEED_API_KEY").map(|key| {
            let header = get("FEED_API_KEY_HEADER").unwrap_or_else(|| "X-API-Key".to_string());
            (header, key)
        });

        let publish = match (get("PUBLISH_S3_BUCKET"), get("PUBLISH_DIR")) {
            (Some(_), Some(_)) => bail!("set only one of PUBLISH_S3_BUCKET and PUBLISH_DIR"),
            (Some(bucket), None) => PublishTarget::S3 {
                bucket,
                prefix: get("PUBLISH_S3_PREFIX").unwrap_or_default(),
                gzip: parse_bool("PUBLISH_GZIP", get("PUBLISH_GZIP"))?.unwrap_or(false),
            },
            (None, Some(dir)) => PublishTarget::Local(PathBuf::from(dir)),
            (None, None) => PublishTarget::Disabled,
        };

        let schedules = Schedules {
            sensors: get("SCHEDULE_SENSORS").unwrap_or_else(|| "*/10 * * * *".to_string()),
            monitor: get("SCHEDULE_MONITOR").unwrap_or_else(|| "*/5 * * * *".to_string()),
            forecast: get("SCHEDULE_FORECAST").unwrap_or_else(|| "0 * * * *".to_string()),
            verify: get("SCHEDULE_VERIFY").unwrap_or_else(|| "20 * * * *".to_string()),
        };

        let defaults = MonitorOptions::default();
        let radius: usize = parse_opt("MONITOR_RADIUS_PX", get("MONITOR_RADIUS_PX"))?.unwrap_or(defaults.radius);
        if radius > MAX_SAMPLE_RADIUS {
            warn!(radius, max = MAX_SAMPLE_RADIUS, "MONITOR_RADIUS_PX capped");
        }
        let threshold = parse("RAIN_THRESHOLD_MM_PER_HOUR")?.unwrap_or(RAIN_THRESHOLD_MM_PER_HOUR);
        let monitor = MonitorOptions {
            threshold,
            save_all: parse_bool("MONITOR_SAVE_ALL", get("MONITOR_SAVE_ALL"))?.unwrap_or(defaults.save_all),
            radius: radius.min(MAX_SAMPLE_RADIUS),
            max_color_distance: parse("MONITOR_MAX_COLOR_DISTANCE")?.unwrap_or(defaults.max_color_distance),
        };

        let d = IntensityThresholds::default();
        let intensity = IntensityThresholds {
            moderate: parse("INTENSITY_MODERATE")?.unwrap_or(d.moderate),
            heavy: parse("INTENSITY_HEAVY")?.unwrap_or(d.heavy),
            very_heavy: parse("INTENSITY_VERY_HEAVY")?.unwrap_or(d.very_heavy),
        };
        if !(intensity.moderate < intensity.heavy && intensity.heavy < intensity.very_heavy) {
            bail!("intensity thresholds must increase: {intensity:?}");
        }

        let a = AccuracyConfig::default();
        let accuracy = AccuracyConfig {
            tolerance: chrono::Duration::minutes(
                parse_opt("VERIFY_TOLERANCE_MINUTES", get("VERIFY_TOLERANCE_MINUTES"))?.unwrap_or(5),
            ),
            // One definition of rain for alerting and scoring.
            rain_threshold: threshold,
            source: parse_opt::<ActualSource>("VERIFY_ACTUAL_SOURCE", get("VERIFY_ACTUAL_SOURCE"))?
                .unwrap_or(a.source),
            history_limit: parse_opt("ACCURACY_HISTORY_LIMIT", get("ACCURACY_HISTORY_LIMIT"))?
                .unwrap_or(a.history_limit),
            history_retention: parse_opt("ACCURACY_HISTORY_RETENTION", get("ACCURACY_HISTORY_RETENTION"))?
                .unwrap_or(a.history_retention)
                .max(1),
        };

        Ok(Config {
            rainfall_url: get("RAINFALL_FEED_URL"),
            water_level_url: get("WATER_LEVEL_FEED_URL"),
            feed_api_key,
            feed_timezone,
            radar_meta_url: get("RADAR_META_URL"),
            radar_station: get("RADAR_STATION").unwrap_or_else(|| "JAK".to_string()),
            forecast_url: get("FORECAST_URL").unwrap_or_else(|| DEFAULT_FORECAST_URL.to_string()),
            forecast_days: parse_opt("FORECAST_DAYS", get("FORECAST_DAYS"))?.unwrap_or(2),
            forecast_concurrency: parse_opt("FORECAST_CONCURRENCY", get("FORECAST_CONCURRENCY"))?.unwrap_or(4),
            forecast_request_delay: Duration::from_millis(
                parse_opt("FORECAST_REQUEST_DELAY_MS", get("FORECAST_REQUEST_DELAY_MS"))?.unwrap_or(250),
            ),
            roster_path: get("PUMP_ROSTER_PATH"),
            store_dir: get("STORE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            publish,
            schedules,
            monitor,
            intensity,
            accuracy,
            verify_lookback: Duration::from_secs(
                3600 * parse_opt::<u64>("VERIFY_LOOKBACK_HOURS", get("VERIFY_LOOKBACK_HOURS"))?.unwrap_or(24),
            ),
            http_timeout: Duration::from_secs(parse_opt("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"))?.unwrap_or(15)),
            job_timeout: Duration::from_secs(parse_opt("JOB_TIMEOUT_SECS", get("JOB_TIMEOUT_SECS"))?.unwrap_or(300)),
        })
    }
}

fn parse_opt<T>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|s| s.parse::<T>().map_err(|e| anyhow::anyhow!("{key}='{s}' is invalid: {e}")))
        .transpose()
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<Option<bool>> {
    raw.map(|s| match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key}='{s}' is not a boolean"),
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.feed_timezone.local_minus_utc(), 7 * 3600);
        assert_eq!(c.publish, PublishTarget::Disabled);
        assert_eq!(c.schedules.sensors, "*/10 * * * *");
        assert_eq!(c.monitor.threshold, 2.0);
        assert_eq!(c.accuracy.rain_threshold, c.monitor.threshold);
        assert_eq!(c.forecast_concurrency, 4);
        assert_eq!(c.forecast_request_delay, Duration::from_millis(250));
        assert_eq!(c.http_timeout, Duration::from_secs(15));
        assert_eq!(c.job_timeout, Duration::from_secs(300));
        assert_eq!(c.accuracy.source, ActualSource::RainGauge);
        assert!(c.rainfall_url.is_none());
    }

    #[test]
    fn test_sampling_radius_is_capped() {
        assert_eq!(config(&[("MONITOR_RADIUS_PX", "3")]).unwrap().monitor.radius, 3);
        let c = config(&[("MONITOR_RADIUS_PX", "18446744073709551615")]).unwrap();
        assert_eq!(c.monitor.radius, MAX_SAMPLE_RADIUS);
        assert!(config(&[("MONITOR_RADIUS_PX", "-1")]).is_err());
    }

    #[test]
    fn test_threshold_is_shared() {
        let c = config(&[("RAIN_THRESHOLD_MM_PER_HOUR", "3.5")]).unwrap();
        assert_eq!(c.monitor.threshold, 3.5);
        assert_eq!(c.accuracy.rain_threshold, 3.5);
    }

    #[test]
    fn test_publish_targets() {
        let c = config(&[("PUBLISH_S3_BUCKET", "b"), ("PUBLISH_GZIP", "yes")]).unwrap();
        assert_eq!(c.publish, PublishTarget::S3 { bucket: "b".into(), prefix: String::new(), gzip: true });
        let c = config(&[("PUBLISH_DIR", "out")]).unwrap();
        assert_eq!(c.publish, PublishTarget::Local(PathBuf::from("out")));
        assert!(config(&[("PUBLISH_DIR", "out"), ("PUBLISH_S3_BUCKET", "b")]).is_err());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(config(&[("HTTP_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config(&[("MONITOR_SAVE_ALL", "maybe")]).is_err());
        assert!(config(&[("VERIFY_ACTUAL_SOURCE", "satellite")]).is_err());
        assert!(config(&[("INTENSITY_HEAVY", "1")]).is_err());
        // Blank is unset.
        assert_eq!(config(&[("FORECAST_DAYS", "  ")]).unwrap().forecast_days, 2);
    }

    #[test]
    fn test_api_key_header() {
        let c = config(&[("FEED_API_KEY", "k")]).unwrap();
        assert_eq!(c.feed_api_key, Some(("X-API-Key".into(), "k".into())));
    }
}
