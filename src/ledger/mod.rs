pub mod models;
pub mod service;

pub use models::{
    DuplicatePolicy, RejectReason, RoundId, ScoreEntry, SourceRef, StoredScore, SubmitOutcome,
};
pub use service::ScoreLedger;
