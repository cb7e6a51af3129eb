use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::Publisher;

/// Writes snapshots as files under a directory. Each file is written to a
/// temporary sibling first and renamed into place.
pub struct LocalPublisher {
    dir: PathBuf,
}

impl LocalPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn is_relative_plain(key: &str) -> bool {
    !key.is_empty() && Path::new(key).components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if !is_relative_plain(key) {
            bail!("refusing to publish outside the output directory: '{key}'");
        }
        let path = self.dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
        Ok(())
    }

    fn target(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::publish_json;
    use serde_json::json;

    #[tokio::test]
    async fn test_overwrites_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path());

        publish_json(&publisher, "latest/rainfall.json", &json!([1])).await.unwrap();
        publish_json(&publisher, "latest/rainfall.json", &json!([2])).await.unwrap();

        let body = std::fs::read_to_string(dir.path().join("latest/rainfall.json")).unwrap();
        assert_eq!(body, "[2]");
        assert!(!dir.path().join("latest/rainfall.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new(dir.path());
        assert!(publisher.put("../x.json", vec![]).await.is_err());
        assert!(publisher.put("/etc/x.json", vec![]).await.is_err());
    }
}
