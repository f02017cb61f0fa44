pub mod models;
pub mod service;

pub use models::{PlayerProfile, ProfileReport, RawProfile, UpsertOutcome};
pub use service::ProfileIngestionService;
