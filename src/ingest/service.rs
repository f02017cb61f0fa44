use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{error, info, instrument, warn};

use super::{
    calculate_score, decode_score_batch, parse_entry, BatchError, BatchSource, EntryFailure,
    IngestError, IngestionReport, RawEntry,
};
use crate::ledger::{DuplicatePolicy, ScoreEntry, ScoreLedger, SubmitOutcome};
use crate::stats::{AggregateUpdater, RoundTracker};
use crate::store::{RetryPolicy, Stores};

const DEFAULT_WORKERS: usize = 8;

type EntryResult = (usize, RawEntry, Result<SubmitOutcome, IngestError>);

/// Drives raw tweets through parse, score, ledger, aggregates and watermark.
pub struct IngestionService {
    ledger: ScoreLedger,
    updater: AggregateUpdater,
    tracker: RoundTracker,
    workers: usize,
    player_mutexes: Arc<RwLock<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl IngestionService {
    pub fn builder(stores: &Stores) -> IngestionServiceBuilder {
        IngestionServiceBuilder::new(stores.clone())
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.ledger.policy()
    }

    /// Reads one uploaded batch object and ingests it.
    #[instrument(skip(self, source))]
    pub async fn run_object(
        &self,
        source: &dyn BatchSource,
        bucket: &str,
        object: &str,
    ) -> Result<IngestionReport, BatchError> {
        let bytes = source.read_object(bucket, object).await?;
        let batch = decode_score_batch(&bytes)?;
        Ok(self.run(batch).await)
    }

    /// Ingests a batch. Never fails as a whole: every entry either reaches a
    /// ledger decision or is skipped and listed in the report.
    ///
    /// Entries for one player run in batch order; different players run
    /// concurrently, up to the configured worker count.
    pub async fn run(&self, batch: Vec<RawEntry>) -> IngestionReport {
        info!(
            entries = batch.len(),
            policy = %self.policy(),
            "Starting score ingestion"
        );

        let mut results: Vec<EntryResult> = stream::iter(group_by_player(batch))
            .map(|(player_id, entries)| self.process_player(player_id, entries))
            .buffer_unordered(self.workers)
            .flat_map(stream::iter)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = IngestionReport::default();
        for (_, entry, result) in results {
            match result {
                Ok(outcome) => report.record_outcome(&outcome),
                Err(err) => report.record_failure(EntryFailure::new(&entry, &err)),
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            inserted = report.inserted,
            updated = report.updated,
            duplicates = report.duplicates,
            resumed = report.resumed,
            "Score ingestion finished"
        );
        report
    }

    /// Runs a single entry through the whole pipeline.
    pub async fn process_entry(&self, entry: &RawEntry) -> Result<SubmitOutcome, IngestError> {
        let record = parse_entry(entry)?;
        let score = calculate_score(&record.attempts)?;
        let score_entry = ScoreEntry::new(record.round_id, score, record.attempts, record.source);

        let outcome = self.ledger.submit(score_entry).await?;
        if let Some(accepted) = outcome.accepted() {
            let entry = &accepted.entry;
            self.updater
                .apply(&entry.player_id, &entry.application_key(), entry.score)
                .await?;
            self.tracker.advance(&entry.round_id).await?;
            self.ledger.mark_applied(accepted).await?;
        }
        Ok(outcome)
    }

    async fn process_player(
        &self,
        player_id: String,
        entries: Vec<(usize, RawEntry)>,
    ) -> Vec<EntryResult> {
        let player_lock = self.player_lock(&player_id).await;
        let _guard = player_lock.lock().await;

        let mut results = Vec::with_capacity(entries.len());
        for (index, entry) in entries {
            let result = self.process_entry(&entry).await;
            if let Err(err) = &result {
                log_failure(&entry, err);
            }
            results.push((index, entry, result));
        }
        results
    }

    async fn player_lock(&self, player_id: &str) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.player_mutexes.read().await;
            if let Some(lock) = guard.get(player_id) {
                return lock.clone();
            }
        }

        let mut guard = self.player_mutexes.write().await;
        guard
            .entry(player_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn log_failure(entry: &RawEntry, err: &IngestError) {
    match err {
        IngestError::IntegrityViolation { .. } => error!(
            tweet_id = %entry.tweet_id,
            author_id = %entry.author_id,
            error = %err,
            "Data consistency alarm, entry skipped"
        ),
        _ => warn!(
            tweet_id = %entry.tweet_id,
            author_id = %entry.author_id,
            kind = err.kind(),
            error = %err,
            "Skipping entry"
        ),
    }
}

/// Groups entries per author, keeping batch order inside each group and
/// the first-seen order between groups.
fn group_by_player(batch: Vec<RawEntry>) -> Vec<(String, Vec<(usize, RawEntry)>)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<(usize, RawEntry)>)> = Vec::new();

    for (index, entry) in batch.into_iter().enumerate() {
        let slot = *positions.entry(entry.author_id.clone()).or_insert_with(|| {
            groups.push((entry.author_id.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((index, entry));
    }
    groups
}

pub struct IngestionServiceBuilder {
    stores: Stores,
    policy: DuplicatePolicy,
    retry: RetryPolicy,
    workers: usize,
}

impl IngestionServiceBuilder {
    fn new(stores: Stores) -> Self {
        Self {
            stores,
            policy: DuplicatePolicy::default(),
            retry: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> IngestionService {
        IngestionService {
            ledger: ScoreLedger::new(self.stores.scores, self.policy).with_retry(self.retry),
            updater: AggregateUpdater::new(self.stores.aggregates).with_retry(self.retry),
            tracker: RoundTracker::new(self.stores.metadata).with_retry(self.retry),
            workers: self.workers.max(1),
            player_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
