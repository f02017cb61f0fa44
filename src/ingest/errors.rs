use thiserror::Error;

use crate::ledger::RoundId;
use crate::store::StoreError;

/// Everything that can make a single raw entry fail to ingest.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Attempts value {0} is out of range")]
    OutOfRangeAttempts(u64),

    #[error("Integrity violation: {count} score records for player {player_id} in round {round_id}")]
    IntegrityViolation {
        round_id: RoundId,
        player_id: String,
        count: usize,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedEntry(_) => "malformed_entry",
            IngestError::OutOfRangeAttempts(_) => "out_of_range_attempts",
            IngestError::IntegrityViolation { .. } => "integrity_violation",
            IngestError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::StoreUnavailable(err.to_string())
    }
}
