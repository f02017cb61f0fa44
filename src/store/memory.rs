use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    AggregateRepository, MetadataRepository, ProfileRepository, ScoreRepository, StoreError,
    Versioned,
};
use crate::ledger::{RoundId, ScoreEntry, StoredScore};
use crate::profiles::{PlayerProfile, UpsertOutcome};
use crate::stats::{PlayerAggregate, RoundWatermark};

/// In-memory document store for development and testing.
///
/// Every collection sits behind its own lock, so each call is atomic on its
/// own document the same way the real backend is.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    scores: RwLock<HashMap<String, ScoreEntry>>,
    aggregates: RwLock<HashMap<String, Versioned<PlayerAggregate>>>,
    watermark: RwLock<Option<RoundWatermark>>,
    profiles: RwLock<HashMap<String, PlayerProfile>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn score_count(&self) -> usize {
        self.scores.read().await.len()
    }
}

#[async_trait]
impl ScoreRepository for InMemoryStore {
    #[instrument(skip(self))]
    async fn find_scores(
        &self,
        round_id: &RoundId,
        player_id: &str,
    ) -> Result<Vec<StoredScore>, StoreError> {
        let scores = self.scores.read().await;
        let mut found: Vec<StoredScore> = scores
            .iter()
            .filter(|(_, entry)| &entry.round_id == round_id && entry.player_id == player_id)
            .map(|(id, entry)| StoredScore {
                id: id.clone(),
                entry: entry.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.entry.recorded_at.cmp(&b.entry.recorded_at));

        debug!(count = found.len(), "Found scores in memory");
        Ok(found)
    }

    #[instrument(skip(self, entry), fields(round_id = %entry.round_id, player_id = %entry.player_id))]
    async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError> {
        let mut scores = self.scores.write().await;
        let taken = scores.values().any(|stored| {
            stored.round_id == entry.round_id && stored.player_id == entry.player_id
        });
        if taken {
            debug!("Score already recorded for pair in memory");
            return Err(StoreError::Conflict(format!(
                "round {} already has a score for {}",
                entry.round_id, entry.player_id
            )));
        }

        let id = Uuid::new_v4().to_string();
        scores.insert(id.clone(), entry.clone());

        debug!(score_id = %id, "Score inserted in memory");
        Ok(id)
    }

    #[instrument(skip(self, entry))]
    async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError> {
        let mut scores = self.scores.write().await;
        match scores.get_mut(id) {
            Some(existing) => {
                *existing = entry.clone();
                debug!(score_id = %id, "Score replaced in memory");
                Ok(())
            }
            None => {
                warn!(score_id = %id, "Score not found for replace in memory");
                Err(StoreError::NotFound(format!("score {id}")))
            }
        }
    }

    #[instrument(skip(self))]
    async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError> {
        let mut scores = self.scores.write().await;
        match scores.get_mut(id) {
            Some(stored) if stored.source.tweet_id == tweet_id => {
                stored.applied = true;
                Ok(())
            }
            Some(_) => {
                debug!(score_id = %id, "Score was replaced before it could be marked");
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("score {id}"))),
        }
    }

    async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError> {
        let scores = self.scores.read().await;
        let distinct: BTreeSet<&RoundId> = scores.values().map(|entry| &entry.round_id).collect();

        let mut rounds: Vec<RoundId> = distinct.into_iter().cloned().collect();
        rounds.sort_by(|a, b| (b.number(), b.as_str()).cmp(&(a.number(), a.as_str())));
        rounds.truncate(limit);
        Ok(rounds)
    }

    async fn scores_for_round(&self, round_id: &RoundId) -> Result<Vec<ScoreEntry>, StoreError> {
        let scores = self.scores.read().await;
        Ok(scores
            .values()
            .filter(|entry| &entry.round_id == round_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AggregateRepository for InMemoryStore {
    async fn get_aggregate(
        &self,
        player_id: &str,
    ) -> Result<Option<Versioned<PlayerAggregate>>, StoreError> {
        Ok(self.aggregates.read().await.get(player_id).cloned())
    }

    #[instrument(skip(self, aggregate), fields(player_id = %aggregate.player_id))]
    async fn compare_and_swap_aggregate(
        &self,
        aggregate: &PlayerAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut aggregates = self.aggregates.write().await;
        let stored_version = aggregates
            .get(&aggregate.player_id)
            .map(|stored| stored.version);

        if stored_version != expected_version {
            debug!(?stored_version, ?expected_version, "Aggregate version mismatch");
            return Err(StoreError::Conflict(format!(
                "aggregate {} is at version {:?}, expected {:?}",
                aggregate.player_id, stored_version, expected_version
            )));
        }

        let version = expected_version.map_or(1, |v| v + 1);
        aggregates.insert(
            aggregate.player_id.clone(),
            Versioned {
                value: aggregate.clone(),
                version,
            },
        );
        Ok(version)
    }

    async fn top_aggregates(&self, limit: usize) -> Result<Vec<PlayerAggregate>, StoreError> {
        let aggregates = self.aggregates.read().await;
        let mut board: Vec<PlayerAggregate> =
            aggregates.values().map(|v| v.value.clone()).collect();
        board.sort_by(PlayerAggregate::leaderboard_order);
        board.truncate(limit);
        Ok(board)
    }
}

#[async_trait]
impl MetadataRepository for InMemoryStore {
    async fn get_watermark(&self) -> Result<Option<RoundWatermark>, StoreError> {
        Ok(self.watermark.read().await.clone())
    }

    #[instrument(skip(self))]
    async fn compare_and_set_watermark(
        &self,
        expected: Option<u64>,
        latest_round: u64,
    ) -> Result<RoundWatermark, StoreError> {
        let mut watermark = self.watermark.write().await;
        let stored = watermark.as_ref().map(|w| w.latest_round);
        if stored != expected {
            return Err(StoreError::Conflict(format!(
                "watermark is {stored:?}, expected {expected:?}"
            )));
        }

        let updated = RoundWatermark::new(latest_round);
        *watermark = Some(updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    #[instrument(skip(self, profile), fields(player_id = %profile.player_id))]
    async fn upsert_profile(&self, profile: &PlayerProfile) -> Result<UpsertOutcome, StoreError> {
        let mut profiles = self.profiles.write().await;
        let outcome = match profiles.insert(profile.player_id.clone(), profile.clone()) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };
        debug!(?outcome, "Profile stored in memory");
        Ok(outcome)
    }

    async fn get_profiles(
        &self,
        player_ids: &[String],
    ) -> Result<HashMap<String, PlayerProfile>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(player_ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}
