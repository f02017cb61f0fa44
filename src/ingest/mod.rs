pub mod models;
pub mod parser;
pub mod scoring;
pub mod service;
pub mod source;

mod errors;

pub use errors::IngestError;
pub use models::{AttemptRecord, EntryFailure, IngestionReport, RawEntry};
pub use parser::parse_entry;
pub use scoring::calculate_score;
pub use service::{IngestionService, IngestionServiceBuilder};
pub use source::{
    decode_profile_batch, decode_score_batch, BatchError, BatchSource, FileBatchSource,
};
