use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use wordle_leaderboard::ledger::{RoundId, ScoreEntry, StoredScore};
use wordle_leaderboard::profiles::{PlayerProfile, UpsertOutcome};
use wordle_leaderboard::stats::{PlayerAggregate, RoundWatermark};
use wordle_leaderboard::store::{
    AggregateRepository, InMemoryStore, MetadataRepository, ProfileRepository, ScoreRepository,
    StoreError, Versioned,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// In-memory store that fails the first `failures` calls with a transient
/// error, and every call while switched offline. Aggregate calls for
/// blocked players fail too, and inserts yield so concurrent writers
/// interleave between the lookup and the write.
pub struct FlakyStore {
    inner: InMemoryStore,
    failures_left: AtomicUsize,
    offline: AtomicBool,
    blocked_players: Mutex<HashSet<String>>,
    stray_scores: Mutex<Vec<StoredScore>>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
            offline: AtomicBool::new(false),
            blocked_players: Mutex::new(HashSet::new()),
            stray_scores: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reliable() -> Self {
        Self::new(0)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Aggregate reads and writes for `player_id` fail until unblocked.
    pub fn block_aggregates_for(&self, player_id: &str) {
        self.blocked_players
            .lock()
            .unwrap()
            .insert(player_id.to_string());
    }

    pub fn unblock_aggregates_for(&self, player_id: &str) {
        self.blocked_players.lock().unwrap().remove(player_id);
    }

    /// Adds a score row that bypassed the uniqueness check, as old data may.
    pub fn add_stray_score(&self, id: &str, entry: ScoreEntry) {
        self.stray_scores.lock().unwrap().push(StoredScore {
            id: id.to_string(),
            entry,
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Err(StoreError::Unavailable("connection reset".into()))
        } else {
            Ok(())
        }
    }

    fn check_player(&self, player_id: &str) -> Result<(), StoreError> {
        self.check()?;
        if self.blocked_players.lock().unwrap().contains(player_id) {
            return Err(StoreError::Unavailable(format!(
                "aggregate shard for {player_id} offline"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreRepository for FlakyStore {
    async fn find_scores(
        &self,
        round_id: &RoundId,
        player_id: &str,
    ) -> Result<Vec<StoredScore>, StoreError> {
        self.check()?;
        let mut found = self.inner.find_scores(round_id, player_id).await?;
        let strays = self.stray_scores.lock().unwrap().clone();
        found.extend(strays.into_iter().filter(|stray| {
            &stray.entry.round_id == round_id && stray.entry.player_id == player_id
        }));
        Ok(found)
    }

    async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError> {
        self.check()?;
        tokio::task::yield_now().await;
        self.inner.insert_score(entry).await
    }

    async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError> {
        self.check()?;
        self.inner.replace_score(id, entry).await
    }

    async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.mark_applied(id, tweet_id).await
    }

    async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError> {
        self.check()?;
        self.inner.recent_rounds(limit).await
    }

    async fn scores_for_round(&self, round_id: &RoundId) -> Result<Vec<ScoreEntry>, StoreError> {
        self.check()?;
        self.inner.scores_for_round(round_id).await
    }
}

#[async_trait]
impl AggregateRepository for FlakyStore {
    async fn get_aggregate(
        &self,
        player_id: &str,
    ) -> Result<Option<Versioned<PlayerAggregate>>, StoreError> {
        self.check_player(player_id)?;
        self.inner.get_aggregate(player_id).await
    }

    async fn compare_and_swap_aggregate(
        &self,
        aggregate: &PlayerAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.check_player(&aggregate.player_id)?;
        self.inner
            .compare_and_swap_aggregate(aggregate, expected_version)
            .await
    }

    async fn top_aggregates(&self, limit: usize) -> Result<Vec<PlayerAggregate>, StoreError> {
        self.check()?;
        self.inner.top_aggregates(limit).await
    }
}

#[async_trait]
impl MetadataRepository for FlakyStore {
    async fn get_watermark(&self) -> Result<Option<RoundWatermark>, StoreError> {
        self.check()?;
        self.inner.get_watermark().await
    }

    async fn compare_and_set_watermark(
        &self,
        expected: Option<u64>,
        latest_round: u64,
    ) -> Result<RoundWatermark, StoreError> {
        self.check()?;
        self.inner
            .compare_and_set_watermark(expected, latest_round)
            .await
    }
}

#[async_trait]
impl ProfileRepository for FlakyStore {
    async fn upsert_profile(&self, profile: &PlayerProfile) -> Result<UpsertOutcome, StoreError> {
        self.check()?;
        self.inner.upsert_profile(profile).await
    }

    async fn get_profiles(
        &self,
        player_ids: &[String],
    ) -> Result<HashMap<String, PlayerProfile>, StoreError> {
        self.check()?;
        self.inner.get_profiles(player_ids).await
    }
}
