//! Builds pipelines and jobs from a [`Config`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::accuracy::AccuracyEngine;
use crate::config::{Config, PublishTarget};
use crate::fetch::{ApiKey, BasicClient, HttpClient};
use crate::forecast::{ForecastCollector, OpenMeteoProvider};
use crate::jobs::{
    FORECAST_JOB, ForecastJob, MONITOR_JOB, MonitorJob, SENSORS_JOB, SensorSyncJob, VERIFY_JOB, VerifyJob,
};
use crate::monitor::MonitorEngine;
use crate::publish::{LocalPublisher, Publisher, S3Publisher};
use crate::radar::HttpRadarProvider;
use crate::roster::PumpRoster;
use crate::scheduler::JobScheduler;
use crate::sensors::{FeedKind, HttpSensorFeed, SensorFusionEngine};
use crate::store::{DocumentStore, JsonlStore};

/// Shared handles every pipeline is built from.
pub struct App {
    pub config: Config,
    pub roster: Arc<PumpRoster>,
    pub store: Arc<dyn DocumentStore>,
    pub http: Arc<dyn HttpClient>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl App {
    pub async fn from_config(config: Config) -> Result<Self> {
        let roster = match &config.roster_path {
            Some(path) => PumpRoster::load(path)?,
            None => PumpRoster::builtin(),
        };
        info!(pumps = roster.len(), "Roster loaded");

        let store = JsonlStore::open(&config.store_dir)
            .await
            .with_context(|| format!("failed to open store at {}", config.store_dir.display()))?;
        let http: Arc<dyn HttpClient> = Arc::new(BasicClient::new(config.http_timeout)?);

        let publisher: Option<Arc<dyn Publisher>> = match &config.publish {
            PublishTarget::Disabled => None,
            PublishTarget::Local(dir) => Some(Arc::new(LocalPublisher::new(dir)) as Arc<dyn Publisher>),
            PublishTarget::S3 { bucket, prefix, gzip } => {
                Some(Arc::new(S3Publisher::from_env(bucket, prefix, *gzip).await) as Arc<dyn Publisher>)
            }
        };
        if let Some(p) = &publisher {
            info!(sink = %p.target(), "Publishing enabled");
        }

        Ok(Self {
            roster: Arc::new(roster),
            store: Arc::new(store),
            http,
            publisher,
            config,
        })
    }

    /// Client for the government feed gateway, keyed when configured.
    fn feed_client(&self) -> Result<Arc<dyn HttpClient>> {
        let client: Arc<dyn HttpClient> = match &self.config.feed_api_key {
            Some((header, key)) => Arc::new(ApiKey::new(self.http.clone(), header, key)?) as Arc<dyn HttpClient>,
            None => self.http.clone(),
        };
        Ok(client)
    }

    pub fn sensor_job(&self) -> Result<SensorSyncJob> {
        let rainfall_url = self.config.rainfall_url.as_deref().context("RAINFALL_FEED_URL is not set")?;
        let water_level_url =
            self.config.water_level_url.as_deref().context("WATER_LEVEL_FEED_URL is not set")?;
        let client = self.feed_client()?;
        let tz = self.config.feed_timezone;

        Ok(SensorSyncJob {
            engine: SensorFusionEngine::new(self.roster.clone(), self.store.clone()),
            rainfall: Box::new(HttpSensorFeed::new(client.clone(), FeedKind::Rainfall, rainfall_url, tz)),
            water_level: Box::new(HttpSensorFeed::new(client, FeedKind::WaterLevel, water_level_url, tz)),
            store: self.store.clone(),
            publisher: self.publisher.clone(),
        })
    }

    pub fn monitor_job(&self) -> Result<MonitorJob> {
        let meta_url = self.config.radar_meta_url.as_deref().context("RADAR_META_URL is not set")?;
        Ok(MonitorJob {
            engine: MonitorEngine::new(self.roster.clone(), self.store.clone(), self.config.intensity),
            provider: Box::new(HttpRadarProvider::new(self.http.clone(), meta_url, &self.config.radar_station)),
            options: self.config.monitor,
            store: self.store.clone(),
            publisher: self.publisher.clone(),
        })
    }

    pub fn forecast_job(&self) -> ForecastJob {
        ForecastJob {
            collector: ForecastCollector::new(
                self.roster.clone(),
                self.store.clone(),
                self.config.forecast_concurrency,
                self.config.forecast_request_delay,
            ),
            provider: Arc::new(OpenMeteoProvider::new(
                self.http.clone(),
                &self.config.forecast_url,
                self.config.forecast_days,
            )),
        }
    }

    pub fn accuracy_engine(&self) -> AccuracyEngine {
        AccuracyEngine::new(self.store.clone(), self.config.accuracy)
    }

    pub fn verify_job(&self) -> VerifyJob {
        VerifyJob {
            engine: self.accuracy_engine(),
            roster: self.roster.clone(),
            lookback: self.config.verify_lookback,
            publisher: self.publisher.clone(),
        }
    }

    /// Registers every job whose inputs are configured. Jobs are left
    /// stopped.
    pub fn register_jobs(&self, scheduler: &JobScheduler) -> Result<Vec<String>> {
        let s = &self.config.schedules;
        let mut names = Vec::new();

        match self.sensor_job() {
            Ok(job) => {
                scheduler.register(SENSORS_JOB, &s.sensors, Arc::new(job))?;
                names.push(SENSORS_JOB.to_string());
            }
            Err(e) => tracing::warn!(job = SENSORS_JOB, reason = %e, "Job not registered"),
        }
        match self.monitor_job() {
            Ok(job) => {
                scheduler.register(MONITOR_JOB, &s.monitor, Arc::new(job))?;
                names.push(MONITOR_JOB.to_string());
            }
            Err(e) => tracing::warn!(job = MONITOR_JOB, reason = %e, "Job not registered"),
        }
        scheduler.register(FORECAST_JOB, &s.forecast, Arc::new(self.forecast_job()))?;
        names.push(FORECAST_JOB.to_string());
        scheduler.register(VERIFY_JOB, &s.verify, Arc::new(self.verify_job()))?;
        names.push(VERIFY_JOB.to_string());

        Ok(names)
    }
}
