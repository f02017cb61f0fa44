use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{LeaderboardEntry, ReportResponse, RoundAttempts};
use crate::store::{
    AggregateRepository, ProfileRepository, RetryPolicy, ScoreRepository, StoreError, Stores,
};

pub const LEADERBOARD_LIMIT: usize = 10;
pub const RECENT_ROUNDS_LIMIT: usize = 20;

/// Read-side projections over the aggregates and the score ledger.
///
/// Each query remembers its last good answer and serves it, marked stale,
/// when the store fails.
pub struct ReportingService {
    scores: Arc<dyn ScoreRepository>,
    aggregates: Arc<dyn AggregateRepository>,
    profiles: Arc<dyn ProfileRepository>,
    retry: RetryPolicy,
    leaderboard_cache: RwLock<Option<ReportResponse<LeaderboardEntry>>>,
    rounds_cache: RwLock<Option<ReportResponse<RoundAttempts>>>,
}

impl ReportingService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            scores: stores.scores.clone(),
            aggregates: stores.aggregates.clone(),
            profiles: stores.profiles.clone(),
            retry: RetryPolicy::default(),
            leaderboard_cache: RwLock::new(None),
            rounds_cache: RwLock::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[instrument(skip(self))]
    pub async fn leaderboard(&self) -> ReportResponse<LeaderboardEntry> {
        match self.load_leaderboard().await {
            Ok(response) => {
                *self.leaderboard_cache.write().await = Some(response.clone());
                response
            }
            Err(err) => {
                warn!(error = %err, "Leaderboard query failed, serving last known response");
                fallback(&self.leaderboard_cache).await
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn round_attempts(&self) -> ReportResponse<RoundAttempts> {
        match self.load_round_attempts().await {
            Ok(response) => {
                *self.rounds_cache.write().await = Some(response.clone());
                response
            }
            Err(err) => {
                warn!(error = %err, "Round attempts query failed, serving last known response");
                fallback(&self.rounds_cache).await
            }
        }
    }

    async fn load_leaderboard(&self) -> Result<ReportResponse<LeaderboardEntry>, StoreError> {
        let aggregates = self.aggregates.as_ref();
        let profiles = self.profiles.as_ref();

        let top = self
            .retry
            .run("top_aggregates", move || {
                aggregates.top_aggregates(LEADERBOARD_LIMIT)
            })
            .await?;

        let player_ids: Vec<String> = top.iter().map(|a| a.player_id.clone()).collect();
        let ids = player_ids.as_slice();
        let known = self
            .retry
            .run("get_profiles", move || profiles.get_profiles(ids))
            .await?;

        debug!(players = top.len(), profiles = known.len(), "Leaderboard loaded");
        Ok(ReportResponse::fresh(
            top.into_iter()
                .map(|aggregate| {
                    let profile = known.get(&aggregate.player_id);
                    LeaderboardEntry::new(aggregate, profile)
                })
                .collect(),
        ))
    }

    async fn load_round_attempts(&self) -> Result<ReportResponse<RoundAttempts>, StoreError> {
        let scores = self.scores.as_ref();
        let rounds = self
            .retry
            .run("recent_rounds", move || {
                scores.recent_rounds(RECENT_ROUNDS_LIMIT)
            })
            .await?;

        let mut data = Vec::with_capacity(rounds.len());
        for round_id in rounds {
            let round_ref = &round_id;
            let entries = self
                .retry
                .run("scores_for_round", move || scores.scores_for_round(round_ref))
                .await?;
            if let Some(best) = RoundAttempts::from_scores(round_id.clone(), &entries) {
                data.push(best);
            }
        }
        Ok(ReportResponse::fresh(data))
    }
}

async fn fallback<T: Clone>(cache: &RwLock<Option<ReportResponse<T>>>) -> ReportResponse<T> {
    cache
        .read()
        .await
        .clone()
        .map(ReportResponse::into_stale)
        .unwrap_or_else(ReportResponse::empty_stale)
}
