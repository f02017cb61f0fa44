// Library crate for the Wordle leaderboard
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod ingest;
pub mod ledger;
pub mod profiles;
pub mod reporting;
pub mod shared;
pub mod stats;
pub mod store;

// Re-export commonly used types for easier access in tests
pub use ingest::{IngestError, IngestionReport, IngestionService, RawEntry};
pub use ledger::{DuplicatePolicy, RoundId, ScoreEntry, ScoreLedger, SubmitOutcome};
pub use profiles::ProfileIngestionService;
pub use reporting::ReportingService;
pub use shared::{AppError, AppState};
pub use stats::{PlayerAggregate, RoundWatermark};
pub use store::{InMemoryStore, PostgresStore, RetryPolicy, StoreError, Stores};
