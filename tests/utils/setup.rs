use std::sync::Arc;
use std::time::Duration;

use wordle_leaderboard::{
    DuplicatePolicy, IngestionService, ProfileIngestionService, RawEntry, ReportingService,
    RetryPolicy, Stores,
};

use super::mocks::FlakyStore;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestPipeline {
    pub store: Arc<FlakyStore>,
    pub stores: Stores,
    pub ingestion: IngestionService,
    pub profiles: ProfileIngestionService,
    pub reporting: ReportingService,
}

pub struct TestPipelineBuilder {
    policy: DuplicatePolicy,
    transient_failures: usize,
    workers: usize,
}

impl TestPipelineBuilder {
    pub fn new() -> Self {
        Self {
            policy: DuplicatePolicy::KeepFirst,
            transient_failures: 0,
            workers: 4,
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The first `count` store calls fail transiently.
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> TestPipeline {
        let store = Arc::new(FlakyStore::new(self.transient_failures));
        let stores = Stores::from_backend(store.clone());
        let retry = RetryPolicy::new(5, Duration::from_millis(1));

        TestPipeline {
            ingestion: IngestionService::builder(&stores)
                .with_policy(self.policy)
                .with_retry(retry)
                .with_workers(self.workers)
                .build(),
            profiles: ProfileIngestionService::new(stores.profiles.clone()).with_retry(retry),
            reporting: ReportingService::new(&stores).with_retry(RetryPolicy::none()),
            store,
            stores,
        }
    }
}

impl Default for TestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A tweet in the shared-result format, `Wordle <round> <attempts>/6`.
pub fn tweet(tweet_id: &str, author_id: &str, round: &str, attempts: &str) -> RawEntry {
    RawEntry::new(
        tweet_id,
        author_id,
        format!("Wordle {round} {attempts}/6\n\n⬛🟨⬛⬛⬛\n🟩🟩🟩🟩🟩"),
    )
}
