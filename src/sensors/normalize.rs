//! Normalization of loosely-typed upstream station records.
//!
//! Government feeds rename and re-case fields between deployments and ship
//! numbers as strings with comma decimals. Each logical field has an ordered
//! list of candidate keys tried case-insensitively; every numeric value goes
//! through [`parse_number`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{FeedKind, SensorObservation};

/// Candidate keys per logical field, highest priority first.
#[derive(Debug, Clone, Copy)]
pub struct ObservationSchema {
    pub name: &'static [&'static str],
    pub lat: &'static [&'static str],
    pub lng: &'static [&'static str],
    pub value: &'static [&'static str],
    pub status: &'static [&'static str],
    pub observed_at: &'static [&'static str],
}

const NAME: &[&str] = &["nama", "nama_pos", "namapos", "name", "station", "station_name", "pos"];
const LAT: &[&str] = &["lat", "latitude", "lintang"];
const LNG: &[&str] = &["lng", "lon", "long", "longitude", "bujur"];
const STATUS: &[&str] = &["status", "siaga", "keterangan", "kondisi", "status_label"];
const OBSERVED_AT: &[&str] = &["tanggal", "waktu", "observed_at", "observedat", "timestamp", "datetime", "date", "time"];

pub const RAINFALL_SCHEMA: ObservationSchema = ObservationSchema {
    name: NAME,
    lat: LAT,
    lng: LNG,
    value: &["val", "value", "curah_hujan", "ch", "rainfall", "rain", "nilai"],
    status: STATUS,
    observed_at: OBSERVED_AT,
};

pub const WATER_LEVEL_SCHEMA: ObservationSchema = ObservationSchema {
    name: NAME,
    lat: LAT,
    lng: LNG,
    value: &["tinggi_air", "tma", "water_level", "waterlevel", "val", "value", "tinggi", "nilai"],
    status: STATUS,
    observed_at: OBSERVED_AT,
};

impl FeedKind {
    pub fn schema(&self) -> &'static ObservationSchema {
        match self {
            FeedKind::Rainfall => &RAINFALL_SCHEMA,
            FeedKind::WaterLevel => &WATER_LEVEL_SCHEMA,
        }
    }
}

/// Parses a loosely-typed number. Accepts JSON numbers and strings such as
/// `"2,5"`, `" 1.234,5 "`, `"1,234.5"` and `"12 cm"`.
///
/// When both `.` and `,` appear, the one appearing last is the decimal
/// separator and the other is a thousands separator.
pub fn parse_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_number_str(s)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_number_str(s: &str) -> Option<f64> {
    let s = s.trim();
    // Keep the leading numeric run; feeds sometimes append units.
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+')))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let s = &s[..end];
    if s.is_empty() {
        return None;
    }

    let cleaned = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) => s.replace(',', "."),
        _ => s.to_string(),
    };
    cleaned.parse().ok()
}

/// Parses an observation timestamp. Naive local times are interpreted in
/// `tz` (the feed's publishing zone); integers are epoch seconds, or epoch
/// milliseconds when too large to be seconds.
pub fn parse_timestamp(v: &Value, tz: FixedOffset) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            let n = n.as_i64()?;
            if n > 100_000_000_000 {
                DateTime::from_timestamp_millis(n)
            } else {
                DateTime::from_timestamp(n, 0)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            const FORMATS: &[&str] = &[
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M",
                "%d/%m/%Y %H:%M:%S",
                "%d/%m/%Y %H:%M",
                "%d-%m-%Y %H:%M",
            ];
            FORMATS.iter().find_map(|f| {
                let naive = NaiveDateTime::parse_from_str(s, f).ok()?;
                tz.from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            })
        }
        _ => None,
    }
}

/// Case-insensitive view over one record's fields.
struct Record<'a> {
    fields: HashMap<String, &'a Value>,
}

impl<'a> Record<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            fields: map.iter().map(|(k, v)| (k.to_lowercase(), v)).collect(),
        }
    }

    /// First alias with a non-null, non-empty value.
    fn get(&self, aliases: &[&str]) -> Option<&'a Value> {
        aliases.iter().find_map(|alias| {
            self.fields.get(*alias).copied().filter(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
        })
    }

    fn text(&self, aliases: &[&str]) -> Option<String> {
        self.get(aliases).map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
    }

    fn number(&self, aliases: &[&str]) -> Option<f64> {
        aliases
            .iter()
            .filter_map(|a| self.get(std::slice::from_ref(a)))
            .find_map(parse_number)
    }
}

/// Outcome of parsing one feed payload.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub observations: Vec<SensorObservation>,
    /// Records skipped for missing name, coordinates or value.
    pub malformed: usize,
}

/// Unwraps `[...]` or `{data: [...]}` (key matched case-insensitively).
pub fn records(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .iter()
            .find(|(k, _)| matches!(k.to_lowercase().as_str(), "data" | "items" | "result"))
            .and_then(|(_, v)| v.as_array()),
        _ => None,
    }
}

/// Parses every station record in `payload` with `schema`.
///
/// Coordinates are only required to be numbers here; `(0,0)` positions are
/// kept and later ignored by nearest-neighbor matching.
pub fn parse_observations(
    payload: &Value,
    schema: &ObservationSchema,
    tz: FixedOffset,
) -> ParsedFeed {
    let mut parsed = ParsedFeed::default();
    let Some(items) = records(payload) else {
        return parsed;
    };

    for item in items {
        let Some(map) = item.as_object() else {
            parsed.malformed += 1;
            continue;
        };
        let rec = Record::new(map);

        let (Some(station_name), Some(lat), Some(lng), Some(value)) = (
            rec.text(schema.name),
            rec.number(schema.lat),
            rec.number(schema.lng),
            rec.number(schema.value),
        ) else {
            parsed.malformed += 1;
            continue;
        };

        parsed.observations.push(SensorObservation {
            station_name,
            lat,
            lng,
            value,
            status_label: rec.text(schema.status).unwrap_or_default(),
            observed_at: rec.get(schema.observed_at).and_then(|v| parse_timestamp(v, tz)),
        });
    }

    parsed
}
