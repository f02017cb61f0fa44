pub mod memory;
pub mod postgres;
pub mod retry;

mod errors;

pub use errors::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ledger::{RoundId, ScoreEntry, StoredScore};
use crate::profiles::{PlayerProfile, UpsertOutcome};
use crate::stats::{PlayerAggregate, RoundWatermark};

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[async_trait]
pub trait ScoreRepository: Send + Sync {
    async fn find_scores(
        &self,
        round_id: &RoundId,
        player_id: &str,
    ) -> Result<Vec<StoredScore>, StoreError>;

    /// Adds a new score document and returns its generated id. Fails with
    /// `StoreError::Conflict` if the (round, player) pair already has one;
    /// the check and the write are a single atomic step.
    async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError>;

    async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError>;

    /// Flags the document as applied downstream, unless it has since been
    /// replaced by a different submission.
    async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError>;

    /// Distinct round ids, newest (highest round number) first.
    async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError>;

    async fn scores_for_round(&self, round_id: &RoundId) -> Result<Vec<ScoreEntry>, StoreError>;
}

#[async_trait]
pub trait AggregateRepository: Send + Sync {
    async fn get_aggregate(
        &self,
        player_id: &str,
    ) -> Result<Option<Versioned<PlayerAggregate>>, StoreError>;

    /// Replaces the whole aggregate document if the stored version still equals
    /// `expected_version` (`None` means the document must not exist yet).
    /// Returns the new version, or `StoreError::Conflict` on a mismatch.
    async fn compare_and_swap_aggregate(
        &self,
        aggregate: &PlayerAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Ordered by average score, then max streak, then total score, all descending.
    async fn top_aggregates(&self, limit: usize) -> Result<Vec<PlayerAggregate>, StoreError>;
}

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn get_watermark(&self) -> Result<Option<RoundWatermark>, StoreError>;

    /// Stores `latest_round` only if the stored round still equals `expected`.
    async fn compare_and_set_watermark(
        &self,
        expected: Option<u64>,
        latest_round: u64,
    ) -> Result<RoundWatermark, StoreError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn upsert_profile(&self, profile: &PlayerProfile) -> Result<UpsertOutcome, StoreError>;

    async fn get_profiles(
        &self,
        player_ids: &[String],
    ) -> Result<HashMap<String, PlayerProfile>, StoreError>;
}

/// The repositories every service is wired from, usually all backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub scores: Arc<dyn ScoreRepository>,
    pub aggregates: Arc<dyn AggregateRepository>,
    pub metadata: Arc<dyn MetadataRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ScoreRepository
            + AggregateRepository
            + MetadataRepository
            + ProfileRepository
            + 'static,
    {
        Self {
            scores: backend.clone(),
            aggregates: backend.clone(),
            metadata: backend.clone(),
            profiles: backend,
        }
    }
}
