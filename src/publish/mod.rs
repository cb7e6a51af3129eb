//! Sinks for the JSON snapshots the dashboard serves verbatim.

mod local;
mod s3;

pub use local::LocalPublisher;
pub use s3::S3Publisher;

use anyhow::Result;
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Writes `body` (already-serialized JSON) under `key`, replacing any
    /// previous snapshot with the same key.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    fn target(&self) -> String;
}

/// Serializes `value` and hands it to `publisher`.
pub async fn publish_json(publisher: &dyn Publisher, key: &str, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    let bytes = body.len();
    publisher.put(key, body).await?;
    tracing::debug!(sink = %publisher.target(), key, bytes, "Snapshot published");
    Ok(())
}

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_is_readable() {
        let packed = gzip(br#"{"ok":true}"#).unwrap();
        let mut out = String::new();
        GzDecoder::new(&packed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, r#"{"ok":true}"#);
    }
}
