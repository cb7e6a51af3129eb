use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::fetch::{HttpClient, fetch_json};
use crate::geo::GeoPoint;

/// Parallel hourly series for one location. All vectors have the same
/// length as `time`; missing values are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyForecast {
    pub time: Vec<DateTime<Utc>>,
    pub temperature: Vec<Option<f64>>,
    pub rain: Vec<Option<f64>>,
    pub precipitation: Vec<Option<f64>>,
    pub probability: Vec<Option<f64>>,
    pub weather_code: Vec<Option<i64>>,
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn hourly(&self, at: GeoPoint) -> Result<HourlyForecast>;
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: OpenMeteoHourly,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    rain: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default, alias = "weathercode")]
    weather_code: Vec<Option<i64>>,
}

/// Open-Meteo style forecast API. Times are requested in GMT.
pub struct OpenMeteoProvider<C> {
    client: C,
    base_url: String,
    forecast_days: u8,
}

impl<C: HttpClient> OpenMeteoProvider<C> {
    pub fn new(client: C, base_url: impl Into<String>, forecast_days: u8) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            forecast_days,
        }
    }

    fn url(&self, at: GeoPoint) -> String {
        format!(
            "{}?latitude={:.4}&longitude={:.4}&hourly=temperature_2m,rain,precipitation,precipitation_probability,weather_code&forecast_days={}&timezone=GMT",
            self.base_url, at.lat, at.lng, self.forecast_days
        )
    }
}

#[async_trait]
impl<C: HttpClient> ForecastProvider for OpenMeteoProvider<C> {
    async fn hourly(&self, at: GeoPoint) -> Result<HourlyForecast> {
        let resp: OpenMeteoResponse = fetch_json(&self.client, &self.url(at)).await?;
        into_hourly(resp.hourly)
    }
}

fn into_hourly(h: OpenMeteoHourly) -> Result<HourlyForecast> {
    let n = h.time.len();
    let time = h
        .time
        .iter()
        .map(|t| parse_gmt(t))
        .collect::<Result<Vec<_>>>()?;

    Ok(HourlyForecast {
        time,
        temperature: pad(h.temperature_2m, n),
        rain: pad(h.rain, n),
        precipitation: pad(h.precipitation, n),
        probability: pad(h.precipitation_probability, n),
        weather_code: pad(h.weather_code, n),
    })
}

/// Open-Meteo returns `2024-01-01T13:00` without seconds or zone.
fn parse_gmt(t: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(naive.and_utc());
        }
    }
    bail!("unrecognized forecast time '{t}'")
}

fn pad<T>(mut v: Vec<Option<T>>, n: usize) -> Vec<Option<T>> {
    v.resize_with(n, || None);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_open_meteo_payload() {
        let body = r#"{
            "latitude": -6.2, "longitude": 106.8, "utc_offset_seconds": 0,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [27.1, 26.8],
                "rain": [0.0, 1.2],
                "precipitation": [0.0, 1.4],
                "precipitation_probability": [10, null],
                "weathercode": [3, 61]
            }
        }"#;
        let resp: OpenMeteoResponse = serde_json::from_str(body).unwrap();
        let h = into_hourly(resp.hourly).unwrap();

        assert_eq!(h.time.len(), 2);
        assert_eq!(h.time[1].to_rfc3339(), "2024-01-01T01:00:00+00:00");
        assert_eq!(h.precipitation[1], Some(1.4));
        assert_eq!(h.probability, vec![Some(10.0), None]);
        assert_eq!(h.weather_code[1], Some(61));
    }

    #[test]
    fn test_short_series_are_padded() {
        let h = into_hourly(OpenMeteoHourly {
            time: vec!["2024-01-01T00:00".into(), "2024-01-01T01:00".into()],
            temperature_2m: vec![],
            rain: vec![Some(0.5)],
            precipitation: vec![Some(0.5), Some(0.7)],
            precipitation_probability: vec![],
            weather_code: vec![],
        })
        .unwrap();
        assert_eq!(h.rain, vec![Some(0.5), None]);
        assert_eq!(h.temperature.len(), 2);
    }

    #[test]
    fn test_bad_time_is_error() {
        assert!(parse_gmt("tomorrow").is_err());
    }
}
