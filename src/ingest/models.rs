use serde::{Deserialize, Serialize};

use super::IngestError;
use crate::ledger::{RoundId, SourceRef, SubmitOutcome};

/// One tweet as delivered in a score batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    #[serde(default)]
    pub tweet_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub tweet: String,
}

impl RawEntry {
    pub fn new(
        tweet_id: impl Into<String>,
        author_id: impl Into<String>,
        tweet: impl Into<String>,
    ) -> Self {
        Self {
            tweet_id: tweet_id.into(),
            author_id: author_id.into(),
            tweet: tweet.into(),
        }
    }

    pub fn source(&self) -> SourceRef {
        SourceRef {
            tweet_id: self.tweet_id.clone(),
            author_id: self.author_id.clone(),
        }
    }
}

/// Round and raw attempts pulled out of a tweet, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub round_id: RoundId,
    pub attempts: String,
    pub source: SourceRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub tweet_id: String,
    pub author_id: String,
    pub kind: &'static str,
    pub message: String,
}

impl EntryFailure {
    pub fn new(entry: &RawEntry, error: &IngestError) -> Self {
        Self {
            tweet_id: entry.tweet_id.clone(),
            author_id: entry.author_id.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Summary of one batch run.
///
/// `processed` counts entries that reached a ledger decision, including
/// rejected duplicates. `skipped` counts entries that failed and are listed
/// in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub processed: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub duplicates: usize,
    /// Records left unapplied by an earlier run and finished by this one.
    pub resumed: usize,
    pub errors: Vec<EntryFailure>,
}

impl IngestionReport {
    pub fn record_outcome(&mut self, outcome: &SubmitOutcome) {
        self.processed += 1;
        match outcome {
            SubmitOutcome::Inserted(_) => self.inserted += 1,
            SubmitOutcome::Updated { .. } => self.updated += 1,
            SubmitOutcome::Resumed(_) => self.resumed += 1,
            SubmitOutcome::Rejected(_) => self.duplicates += 1,
        }
    }

    pub fn record_failure(&mut self, failure: EntryFailure) {
        self.skipped += 1;
        self.errors.push(failure);
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped
    }
}
