use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use super::{Publisher, gzip};

/// Uploads snapshots to `s3://bucket/prefix/key`, optionally gzip-encoded
/// (stored as `key.gz` with `Content-Encoding: gzip`).
pub struct S3Publisher {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    gzip: bool,
}

impl S3Publisher {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, prefix: impl Into<String>, gzip: bool) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
            gzip,
        }
    }

    /// Client from the ambient AWS environment.
    pub async fn from_env(bucket: impl Into<String>, prefix: impl Into<String>, gzip: bool) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, prefix, gzip)
    }

    fn object_key(&self, key: &str) -> String {
        let key = if self.gzip { format!("{key}.gz") } else { key.to_string() };
        if self.prefix.is_empty() { key } else { format!("{}/{key}", self.prefix) }
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let object_key = self.object_key(key);
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type("application/json");

        let body = if self.gzip {
            req = req.content_encoding("gzip");
            gzip(&body)?
        } else {
            body
        };

        req.body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{}/{object_key}", self.bucket))?;
        Ok(())
    }

    fn target(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(prefix: &str, gzip: bool) -> S3Publisher {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("ap-southeast-3"))
            .build();
        S3Publisher::new(aws_sdk_s3::Client::from_conf(config), "bucket", prefix, gzip)
    }

    #[test]
    fn test_object_keys() {
        assert_eq!(publisher("", false).object_key("a.json"), "a.json");
        assert_eq!(publisher("/snapshots/", false).object_key("a.json"), "snapshots/a.json");
        assert_eq!(publisher("snapshots", true).object_key("a.json"), "snapshots/a.json.gz");
    }
}
