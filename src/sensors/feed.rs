use anyhow::Result;
use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::Value;
use tracing::debug;

use super::FeedKind;
use super::normalize::{ParsedFeed, parse_observations};
use crate::fetch::{HttpClient, fetch_json};

/// A source of station observations for one feed family.
#[async_trait]
pub trait SensorFeed: Send + Sync {
    fn kind(&self) -> FeedKind;

    async fn fetch(&self) -> Result<ParsedFeed>;
}

/// JSON-over-HTTP government feed.
pub struct HttpSensorFeed<C> {
    client: C,
    kind: FeedKind,
    url: String,
    tz: FixedOffset,
}

impl<C: HttpClient> HttpSensorFeed<C> {
    pub fn new(client: C, kind: FeedKind, url: impl Into<String>, tz: FixedOffset) -> Self {
        Self {
            client,
            kind,
            url: url.into(),
            tz,
        }
    }
}

#[async_trait]
impl<C: HttpClient> SensorFeed for HttpSensorFeed<C> {
    fn kind(&self) -> FeedKind {
        self.kind
    }

    #[tracing::instrument(skip(self), fields(feed = %self.kind, url = %self.url))]
    async fn fetch(&self) -> Result<ParsedFeed> {
        let payload: Value = fetch_json(&self.client, &self.url).await?;
        let parsed = parse_observations(&payload, self.kind.schema(), self.tz);
        debug!(
            observations = parsed.observations.len(),
            malformed = parsed.malformed,
            "Feed parsed"
        );
        Ok(parsed)
    }
}
