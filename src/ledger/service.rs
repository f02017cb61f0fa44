use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{DuplicatePolicy, RejectReason, ScoreEntry, StoredScore, SubmitOutcome};
use crate::ingest::IngestError;
use crate::store::{RetryPolicy, ScoreRepository, StoreError};

const MAX_CONFLICTS: u32 = 5;

/// Sole writer of score records. Guarantees at most one record per
/// (round, player) and decides whether a submission counts downstream.
pub struct ScoreLedger {
    repository: Arc<dyn ScoreRepository>,
    policy: DuplicatePolicy,
    retry: RetryPolicy,
}

impl ScoreLedger {
    pub fn new(repository: Arc<dyn ScoreRepository>, policy: DuplicatePolicy) -> Self {
        Self {
            repository,
            policy,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Records `entry` unless the pair already has a score and the policy
    /// keeps the first one.
    ///
    /// The store rejects a second insert for a pair, so a writer that loses
    /// the race re-reads and resolves against the winner's record. A record
    /// that never finished its downstream steps is handed back as `Resumed`.
    #[instrument(skip(self, entry), fields(round_id = %entry.round_id, player_id = %entry.player_id))]
    pub async fn submit(&self, entry: ScoreEntry) -> Result<SubmitOutcome, IngestError> {
        let repository = self.repository.as_ref();
        let round_id = &entry.round_id;
        let player_id = entry.player_id.as_str();

        for attempt in 1..=MAX_CONFLICTS {
            let existing = self
                .retry
                .run("find_scores", move || {
                    repository.find_scores(round_id, player_id)
                })
                .await?;

            match existing.as_slice() {
                [] => {
                    let entry_ref = &entry;
                    let inserted = self
                        .retry
                        .run("insert_score", move || repository.insert_score(entry_ref))
                        .await;
                    match inserted {
                        Ok(id) => {
                            info!(score_id = %id, score = entry.score, "Recorded new score");
                            return Ok(SubmitOutcome::Inserted(StoredScore {
                                id,
                                entry: entry.clone(),
                            }));
                        }
                        Err(StoreError::Conflict(reason)) => {
                            warn!(attempt, %reason, "Score recorded concurrently, re-reading");
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                [current] => return self.resolve(current, &entry).await,
                records => {
                    error!(
                        count = records.len(),
                        "Score uniqueness broken: multiple records for one player and round"
                    );
                    return Err(IngestError::IntegrityViolation {
                        round_id: entry.round_id.clone(),
                        player_id: entry.player_id.clone(),
                        count: records.len(),
                    });
                }
            }
        }

        Err(IngestError::StoreUnavailable(format!(
            "score for {player_id} in round {round_id} kept conflicting"
        )))
    }

    /// Flags a record once the aggregate and watermark include it.
    pub async fn mark_applied(&self, stored: &StoredScore) -> Result<(), IngestError> {
        let repository = self.repository.as_ref();
        let id = stored.id.as_str();
        let tweet_id = stored.entry.source.tweet_id.as_str();
        self.retry
            .run("mark_applied", move || repository.mark_applied(id, tweet_id))
            .await?;
        Ok(())
    }

    async fn resolve(
        &self,
        current: &StoredScore,
        entry: &ScoreEntry,
    ) -> Result<SubmitOutcome, IngestError> {
        if self.policy == DuplicatePolicy::KeepFirst || current.entry.is_same_submission(entry) {
            if current.entry.applied {
                debug!(
                    existing_tweet = %current.entry.source.tweet_id,
                    tweet_id = %entry.source.tweet_id,
                    "Ignoring duplicate score"
                );
                return Ok(SubmitOutcome::Rejected(RejectReason::Duplicate));
            }
            info!(score_id = %current.id, "Resuming score left unapplied");
            return Ok(SubmitOutcome::Resumed(current.clone()));
        }

        let repository = self.repository.as_ref();
        let id = current.id.as_str();
        self.retry
            .run("replace_score", move || repository.replace_score(id, entry))
            .await?;
        info!(
            score_id = %current.id,
            previous = current.entry.score,
            score = entry.score,
            "Replaced score with latest submission"
        );
        Ok(SubmitOutcome::Updated {
            previous: current.entry.clone(),
            current: StoredScore {
                id: current.id.clone(),
                entry: entry.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{RoundId, SourceRef};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn entry(tweet_id: &str, score: u8, attempts: &str) -> ScoreEntry {
        ScoreEntry::new(
            RoundId::new("455"),
            score,
            attempts,
            SourceRef {
                tweet_id: tweet_id.to_string(),
                author_id: "u1".to_string(),
            },
        )
    }

    fn ledger(store: &Arc<InMemoryStore>, policy: DuplicatePolicy) -> ScoreLedger {
        ScoreLedger::new(store.clone(), policy).with_retry(RetryPolicy::none())
    }

    /// Serves extra rows from `find_scores`, like a table that predates the
    /// uniqueness constraint.
    struct LegacyRows {
        inner: InMemoryStore,
        extra: Vec<StoredScore>,
    }

    /// Commits the first insert but reports it as a dropped connection.
    struct LostAck {
        inner: InMemoryStore,
        dropped: AtomicBool,
    }

    #[async_trait]
    impl ScoreRepository for LegacyRows {
        async fn find_scores(
            &self,
            round_id: &RoundId,
            player_id: &str,
        ) -> Result<Vec<StoredScore>, StoreError> {
            let mut found = self.inner.find_scores(round_id, player_id).await?;
            found.extend(self.extra.iter().cloned());
            Ok(found)
        }
        async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError> {
            self.inner.insert_score(entry).await
        }
        async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError> {
            self.inner.replace_score(id, entry).await
        }
        async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError> {
            self.inner.mark_applied(id, tweet_id).await
        }
        async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError> {
            self.inner.recent_rounds(limit).await
        }
        async fn scores_for_round(
            &self,
            round_id: &RoundId,
        ) -> Result<Vec<ScoreEntry>, StoreError> {
            self.inner.scores_for_round(round_id).await
        }
    }

    #[async_trait]
    impl ScoreRepository for LostAck {
        async fn find_scores(
            &self,
            round_id: &RoundId,
            player_id: &str,
        ) -> Result<Vec<StoredScore>, StoreError> {
            self.inner.find_scores(round_id, player_id).await
        }
        async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError> {
            let id = self.inner.insert_score(entry).await?;
            if !self.dropped.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            Ok(id)
        }
        async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError> {
            self.inner.replace_score(id, entry).await
        }
        async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError> {
            self.inner.mark_applied(id, tweet_id).await
        }
        async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError> {
            self.inner.recent_rounds(limit).await
        }
        async fn scores_for_round(
            &self,
            round_id: &RoundId,
        ) -> Result<Vec<ScoreEntry>, StoreError> {
            self.inner.scores_for_round(round_id).await
        }
    }

    #[tokio::test]
    async fn inserts_first_score_for_pair() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store, DuplicatePolicy::KeepFirst);

        let outcome = ledger.submit(entry("t1", 5, "2")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Inserted(ref s) if s.entry.score == 5));
        assert_eq!(store.score_count().await, 1);
    }

    #[tokio::test]
    async fn keep_first_rejects_later_scores_once_applied() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store, DuplicatePolicy::KeepFirst);

        let first = ledger.submit(entry("t1", 5, "2")).await.unwrap();
        ledger.mark_applied(first.accepted().unwrap()).await.unwrap();
        let outcome = ledger.submit(entry("t2", 1, "6")).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::Rejected(RejectReason::Duplicate));
        assert!(outcome.accepted().is_none());

        let stored = store.find_scores(&RoundId::new("455"), "u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].entry.score, 5);
    }

    #[tokio::test]
    async fn unapplied_record_is_resumed_instead_of_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store, DuplicatePolicy::KeepFirst);

        let first = ledger.submit(entry("t1", 5, "2")).await.unwrap();
        let rerun = ledger.submit(entry("t1", 5, "2")).await.unwrap();

        match rerun {
            SubmitOutcome::Resumed(stored) => {
                assert_eq!(stored.id, first.accepted().unwrap().id);
                assert_eq!(stored.entry.source.tweet_id, "t1");
            }
            other => panic!("expected resume, got {other:?}"),
        }
        assert_eq!(store.score_count().await, 1);
    }

    #[tokio::test]
    async fn keep_latest_overwrites_in_place() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store, DuplicatePolicy::KeepLatest);

        let first = ledger.submit(entry("t1", 5, "2")).await.unwrap();
        ledger.mark_applied(first.accepted().unwrap()).await.unwrap();
        let outcome = ledger.submit(entry("t2", 1, "6")).await.unwrap();

        match &outcome {
            SubmitOutcome::Updated { previous, current } => {
                assert_eq!(previous.score, 5);
                assert_eq!(current.entry.score, 1);
                assert_eq!(current.id, first.accepted().unwrap().id);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(outcome.accepted().unwrap().entry.source.tweet_id, "t2");

        let stored = store.find_scores(&RoundId::new("455"), "u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].entry.score, 1);
        assert!(!stored[0].entry.applied);
    }

    #[tokio::test]
    async fn keep_latest_treats_the_same_tweet_as_a_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(&store, DuplicatePolicy::KeepLatest);

        let first = ledger.submit(entry("t1", 5, "2")).await.unwrap();
        ledger.mark_applied(first.accepted().unwrap()).await.unwrap();
        let outcome = ledger.submit(entry("t1", 5, "2")).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::Rejected(RejectReason::Duplicate));
    }

    #[tokio::test]
    async fn insert_whose_ack_was_lost_is_resumed() {
        let store = Arc::new(LostAck {
            inner: InMemoryStore::new(),
            dropped: AtomicBool::new(false),
        });
        let ledger = ScoreLedger::new(store.clone(), DuplicatePolicy::KeepFirst)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));

        let outcome = ledger.submit(entry("t1", 5, "2")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Resumed(ref s) if s.entry.score == 5));
        assert_eq!(store.inner.score_count().await, 1);
    }

    #[tokio::test]
    async fn reports_integrity_violation_without_repairing() {
        let inner = InMemoryStore::new();
        inner.insert_score(&entry("t1", 5, "2")).await.unwrap();
        let store = Arc::new(LegacyRows {
            inner,
            extra: vec![StoredScore {
                id: "legacy".into(),
                entry: entry("t0", 4, "3"),
            }],
        });
        let ledger = ScoreLedger::new(store.clone(), DuplicatePolicy::KeepLatest)
            .with_retry(RetryPolicy::none());

        let result = ledger.submit(entry("t3", 6, "1")).await;

        assert!(matches!(
            result,
            Err(IngestError::IntegrityViolation { count: 2, .. })
        ));
        assert_eq!(store.inner.score_count().await, 1);
    }
}
