//! Read-side JSON views consumed by the dashboard.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::monitor::{MonitorSummary, ReflectivitySample};
use crate::sensors::{FeedKind, FusedRecord};
use crate::store::{DocumentStore, Order, Query, collections, find_as};

/// Latest fused record per pump for one feed, highest value first.
pub async fn latest_fused(store: &dyn DocumentStore, kind: FeedKind) -> Result<Vec<FusedRecord>> {
    let docs = store
        .latest_per_key(
            kind.collection(),
            "pumpName",
            "fetchedAt",
            &Query::new().sort("value", Order::Desc),
        )
        .await
        .with_context(|| format!("failed to read latest {kind} records"))?;

    docs.into_iter()
        .map(|d| serde_json::from_value(d).context("stored fused record is malformed"))
        .collect()
}

/// `[start, end)` in UTC covering `day` in the local zone `tz`.
pub fn local_day_bounds(day: NaiveDate, tz: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = tz.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()?;
    let end = tz.from_local_datetime(&day.succ_opt()?.and_hms_opt(0, 0, 0)?).single()?;
    Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

/// One pump's radar samples for a local calendar day, oldest first.
pub async fn radar_history(
    store: &dyn DocumentStore,
    pump: &str,
    day: NaiveDate,
    tz: FixedOffset,
) -> Result<Vec<ReflectivitySample>> {
    let (start, end) =
        local_day_bounds(day, tz).with_context(|| format!("invalid day {day}"))?;
    let samples = find_as(
        store,
        collections::RADAR_SAMPLES,
        &Query::new()
            .eq("pump.name", pump)
            .range("capturedAt", start.to_rfc3339(), end.to_rfc3339())
            .sort("capturedAt", Order::Asc),
    )
    .await
    .context("failed to read radar history")?;
    Ok(samples)
}

pub async fn latest_monitor_summary(store: &dyn DocumentStore) -> Result<Option<MonitorSummary>> {
    let mut runs: Vec<MonitorSummary> = find_as(
        store,
        collections::MONITOR_RUNS,
        &Query::new().sort("startedAt", Order::Desc).limit(1),
    )
    .await
    .context("failed to read monitor runs")?;
    Ok(runs.pop())
}

/// Snapshot published after each cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub rainfall: Vec<FusedRecord>,
    pub water_level: Vec<FusedRecord>,
    pub monitor: Option<MonitorSummary>,
}

impl Dashboard {
    pub async fn load(store: &dyn DocumentStore) -> Result<Self> {
        Ok(Self {
            generated_at: Utc::now(),
            rainfall: latest_fused(store, FeedKind::Rainfall).await?,
            water_level: latest_fused(store, FeedKind::WaterLevel).await?,
            monitor: latest_monitor_summary(store).await?,
        })
    }
}
