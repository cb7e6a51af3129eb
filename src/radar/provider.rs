//! Radar frame acquisition.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::frame::{Bounds, RadarFrame};
use super::legend::ColorLegend;
use crate::fetch::{HttpClient, fetch_bytes, fetch_json};

/// Source of the latest radar frame.
#[async_trait]
pub trait RadarProvider: Send + Sync {
    async fn capture(&self) -> Result<RadarFrame>;
}

/// Frame metadata published next to each radar image.
#[derive(Debug, Deserialize)]
struct FrameMeta {
    #[serde(alias = "imageUrl", alias = "image")]
    image_url: String,
    bounds: Bounds,
    #[serde(default, alias = "radar", alias = "stationCode")]
    station: Option<String>,
    #[serde(default)]
    legend: Option<ColorLegend>,
    #[serde(default, alias = "capturedAt", alias = "time")]
    captured_at: Option<DateTime<Utc>>,
}

/// Fetches a metadata document, then the image it points at.
///
/// When the metadata carries no legend, [`ColorLegend::standard`] is used.
pub struct HttpRadarProvider<C> {
    client: C,
    meta_url: String,
    default_station: String,
}

impl<C: HttpClient> HttpRadarProvider<C> {
    pub fn new(client: C, meta_url: impl Into<String>, default_station: impl Into<String>) -> Self {
        Self {
            client,
            meta_url: meta_url.into(),
            default_station: default_station.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> RadarProvider for HttpRadarProvider<C> {
    #[tracing::instrument(skip(self), fields(meta_url = %self.meta_url))]
    async fn capture(&self) -> Result<RadarFrame> {
        let meta: FrameMeta = fetch_json(&self.client, &self.meta_url).await?;
        let image = fetch_bytes(&self.client, &meta.image_url)
            .await
            .context("radar image download failed")?;
        debug!(bytes = image.len(), image_url = %meta.image_url, "Radar image received");

        RadarFrame::from_image_bytes(
            &image,
            meta.bounds,
            meta.legend.unwrap_or_else(ColorLegend::standard),
            meta.station.unwrap_or_else(|| self.default_station.clone()),
            meta.captured_at.unwrap_or_else(Utc::now),
        )
    }
}
