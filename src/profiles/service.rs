use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{PlayerProfile, ProfileReport, UpsertOutcome};
use crate::ingest::{decode_profile_batch, BatchError, BatchSource};
use crate::store::{ProfileRepository, RetryPolicy};

/// Stores player display data delivered alongside the score batches.
pub struct ProfileIngestionService {
    repository: Arc<dyn ProfileRepository>,
    retry: RetryPolicy,
}

impl ProfileIngestionService {
    pub fn new(repository: Arc<dyn ProfileRepository>) -> Self {
        Self {
            repository,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[instrument(skip(self, source))]
    pub async fn run_object(
        &self,
        source: &dyn BatchSource,
        bucket: &str,
        object: &str,
    ) -> Result<ProfileReport, BatchError> {
        let bytes = source.read_object(bucket, object).await?;
        let profiles = decode_profile_batch(&bytes)?;
        Ok(self.run(profiles).await)
    }

    /// Creates or merges every profile; a failing profile is skipped.
    pub async fn run(&self, profiles: Vec<PlayerProfile>) -> ProfileReport {
        let repository = self.repository.as_ref();
        let mut report = ProfileReport::default();

        for profile in &profiles {
            if profile.username.is_empty() {
                warn!(player_id = %profile.player_id, "Skipping profile without username");
                report.skipped += 1;
                continue;
            }

            let result = self
                .retry
                .run("upsert_profile", move || repository.upsert_profile(profile))
                .await;

            match result {
                Ok(UpsertOutcome::Created) => {
                    debug!(player_id = %profile.player_id, "Profile created");
                    report.created += 1;
                }
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(err) => {
                    warn!(player_id = %profile.player_id, error = %err, "Failed to store profile");
                    report.skipped += 1;
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Profile ingestion finished"
        );
        report
    }
}
