use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::WatermarkUpdate;
use crate::ingest::IngestError;
use crate::ledger::RoundId;
use crate::store::{MetadataRepository, RetryPolicy, StoreError};

const MAX_CONFLICTS: u32 = 5;

/// Keeps the "latest round" watermark moving forward only.
pub struct RoundTracker {
    repository: Arc<dyn MetadataRepository>,
    retry: RetryPolicy,
}

impl RoundTracker {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self {
            repository,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn latest_round(&self) -> Result<Option<u64>, IngestError> {
        let repository = self.repository.as_ref();
        let watermark = self
            .retry
            .run("get_watermark", move || repository.get_watermark())
            .await?;
        Ok(watermark.map(|w| w.latest_round))
    }

    #[instrument(skip(self), fields(round_id = %round_id))]
    pub async fn advance(&self, round_id: &RoundId) -> Result<WatermarkUpdate, IngestError> {
        let Some(round) = round_id.number() else {
            debug!("Round id is not numeric, watermark untouched");
            return Ok(WatermarkUpdate::Unchanged {
                latest: self.latest_round().await?,
            });
        };

        let repository = self.repository.as_ref();
        for attempt in 1..=MAX_CONFLICTS {
            let stored = self.latest_round().await?;
            if matches!(stored, Some(latest) if round <= latest) {
                return Ok(WatermarkUpdate::Unchanged { latest: stored });
            }

            let result = self
                .retry
                .run("compare_and_set_watermark", move || {
                    repository.compare_and_set_watermark(stored, round)
                })
                .await;

            match result {
                Ok(_) => {
                    info!(from = ?stored, to = round, "Latest round advanced");
                    return Ok(match stored {
                        Some(from) => WatermarkUpdate::Advanced { from, to: round },
                        None => WatermarkUpdate::Initialized(round),
                    });
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(attempt, %reason, "Watermark changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(IngestError::StoreUnavailable(format!(
            "watermark kept changing while advancing to {round}"
        )))
    }
}
