//! Scheduler jobs wrapping each pipeline, plus snapshot publishing.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::accuracy::{AccuracyEngine, AccuracyMetrics};
use crate::forecast::{ForecastCollector, ForecastProvider};
use crate::monitor::{MonitorEngine, MonitorOptions};
use crate::publish::{Publisher, publish_json};
use crate::radar::RadarProvider;
use crate::roster::PumpRoster;
use crate::scheduler::Job;
use crate::sensors::{SensorFeed, SensorFusionEngine};
use crate::store::DocumentStore;
use crate::views::Dashboard;

pub const SENSORS_JOB: &str = "sync-sensors";
pub const MONITOR_JOB: &str = "monitor";
pub const FORECAST_JOB: &str = "sync-forecast";
pub const VERIFY_JOB: &str = "verify";

/// Publishes the latest fused sets and monitor summary.
pub async fn publish_dashboard(publisher: &dyn Publisher, store: &dyn DocumentStore) -> Result<()> {
    let dash = Dashboard::load(store).await?;
    publish_json(publisher, "latest/rainfall.json", &dash.rainfall).await?;
    publish_json(publisher, "latest/water_level.json", &dash.water_level).await?;
    if let Some(summary) = &dash.monitor {
        publish_json(publisher, "monitor/latest.json", summary).await?;
    }
    publish_json(publisher, "dashboard.json", &dash)
        .await
        .with_context(|| format!("failed to publish to {}", publisher.target()))
}

pub struct SensorSyncJob {
    pub engine: SensorFusionEngine,
    pub rainfall: Box<dyn SensorFeed>,
    pub water_level: Box<dyn SensorFeed>,
    pub store: Arc<dyn DocumentStore>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

#[async_trait]
impl Job for SensorSyncJob {
    async fn run(&self) -> Result<()> {
        let report = self
            .engine
            .run_cycle(self.rainfall.as_ref(), self.water_level.as_ref())
            .await;

        if let Some(publisher) = &self.publisher {
            publish_dashboard(publisher.as_ref(), self.store.as_ref()).await?;
        }
        if !report.is_success() {
            bail!("sensor cycle incomplete: {}", report.errors().join("; "));
        }
        Ok(())
    }
}

pub struct MonitorJob {
    pub engine: MonitorEngine,
    pub provider: Box<dyn RadarProvider>,
    pub options: MonitorOptions,
    pub store: Arc<dyn DocumentStore>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

#[async_trait]
impl Job for MonitorJob {
    async fn run(&self) -> Result<()> {
        let summary = self.engine.run(self.provider.as_ref(), &self.options).await?;
        if summary.alert_count > 0 {
            warn!(
                alert_count = summary.alert_count,
                pumps = ?summary.alerts.iter().map(|a| a.pump_name.as_str()).collect::<Vec<_>>(),
                "Rain alert"
            );
        }
        if let Some(publisher) = &self.publisher {
            publish_dashboard(publisher.as_ref(), self.store.as_ref()).await?;
        }
        Ok(())
    }
}

pub struct ForecastJob {
    pub collector: ForecastCollector,
    pub provider: Arc<dyn ForecastProvider>,
}

#[async_trait]
impl Job for ForecastJob {
    async fn run(&self) -> Result<()> {
        let report = self.collector.run(self.provider.clone()).await?;
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "Some forecast locations failed");
        }
        Ok(())
    }
}

/// Verifies the trailing `lookback` window, then scores every pump over the
/// same window.
pub struct VerifyJob {
    pub engine: AccuracyEngine,
    pub roster: Arc<PumpRoster>,
    pub lookback: Duration,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl VerifyJob {
    pub async fn score_all(&self) -> Result<Vec<AccuracyMetrics>> {
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(self.lookback)?;

        let mut all = Vec::new();
        for pump in self.roster.pumps() {
            if let Some(m) = self.engine.calculate_metrics(&pump.name, start, end).await? {
                all.push(m);
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl Job for VerifyJob {
    async fn run(&self) -> Result<()> {
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(self.lookback)?;

        let report = self.engine.verify(start, end).await?;
        let metrics = self.score_all().await?;
        info!(scored = metrics.len(), "Accuracy metrics updated");

        if let Some(publisher) = &self.publisher {
            publish_json(publisher.as_ref(), "accuracy/latest.json", &metrics).await?;
        }
        if report.failed > 0 {
            bail!("{} verifications could not be stored", report.failed);
        }
        Ok(())
    }
}
