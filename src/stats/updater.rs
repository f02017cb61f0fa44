use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::PlayerAggregate;
use crate::ingest::IngestError;
use crate::store::{AggregateRepository, RetryPolicy, StoreError};

const DEFAULT_MAX_CONFLICTS: u32 = 5;

/// Sole writer of player aggregates.
pub struct AggregateUpdater {
    repository: Arc<dyn AggregateRepository>,
    retry: RetryPolicy,
    max_conflicts: u32,
}

impl AggregateUpdater {
    pub fn new(repository: Arc<dyn AggregateRepository>) -> Self {
        Self {
            repository,
            retry: RetryPolicy::default(),
            max_conflicts: DEFAULT_MAX_CONFLICTS,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_conflicts(mut self, max_conflicts: u32) -> Self {
        self.max_conflicts = max_conflicts.max(1);
        self
    }

    /// Folds one accepted score into the player's aggregate.
    ///
    /// Read, recompute, then compare-and-swap on the stored version. A lost
    /// race re-reads and recomputes from the winner's document. A `key`
    /// already recorded in the aggregate leaves it untouched.
    #[instrument(skip(self))]
    pub async fn apply(
        &self,
        player_id: &str,
        key: &str,
        score: u8,
    ) -> Result<PlayerAggregate, IngestError> {
        let repository = self.repository.as_ref();

        for attempt in 1..=self.max_conflicts {
            let current = self
                .retry
                .run("get_aggregate", move || repository.get_aggregate(player_id))
                .await?;

            let (base, expected_version) = match current {
                Some(stored) => (stored.value, Some(stored.version)),
                None => (PlayerAggregate::new(player_id), None),
            };
            if base.has_applied(key) {
                debug!(key, "Submission already counted in aggregate");
                return Ok(base);
            }
            let updated = base.record_keyed(key, score);

            let updated_ref = &updated;
            let swapped = self
                .retry
                .run("compare_and_swap_aggregate", move || {
                    repository.compare_and_swap_aggregate(updated_ref, expected_version)
                })
                .await;

            match swapped {
                Ok(version) => {
                    debug!(
                        version,
                        rounds_played = updated.rounds_played,
                        average_score = updated.average_score,
                        current_streak = updated.current_streak,
                        "Aggregate updated"
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(attempt, %reason, "Aggregate changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(IngestError::StoreUnavailable(format!(
            "aggregate for {player_id} kept changing after {} attempts",
            self.max_conflicts
        )))
    }
}
