use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

use super::RawEntry;
use crate::profiles::{PlayerProfile, RawProfile};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode batch: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Object storage holding uploaded batch files.
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, BatchError>;
}

/// Reads `<root>/<bucket>/<object>` from the local filesystem.
pub struct FileBatchSource {
    root: PathBuf,
}

impl FileBatchSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf, BatchError> {
        for name in [bucket, object] {
            let relative = Path::new(name);
            let plain = !name.is_empty()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)));
            if !plain {
                return Err(BatchError::InvalidObjectName(name.to_string()));
            }
        }
        Ok(self.root.join(bucket).join(object))
    }
}

#[async_trait]
impl BatchSource for FileBatchSource {
    #[instrument(skip(self))]
    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, BatchError> {
        let path = self.object_path(bucket, object)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| BatchError::Read {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), bytes = bytes.len(), "Read batch object");
        Ok(bytes)
    }
}

/// A score batch is a JSON array of `{tweetId, authorId, tweet}` objects.
pub fn decode_score_batch(bytes: &[u8]) -> Result<Vec<RawEntry>, BatchError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A profile batch is a JSON object keyed by player id.
pub fn decode_profile_batch(bytes: &[u8]) -> Result<Vec<PlayerProfile>, BatchError> {
    let raw: BTreeMap<String, RawProfile> = serde_json::from_slice(bytes)?;
    Ok(raw
        .into_iter()
        .map(|(player_id, profile)| PlayerProfile::from_raw(player_id, profile))
        .collect())
}
