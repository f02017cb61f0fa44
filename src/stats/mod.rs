pub mod models;
pub mod updater;
pub mod watermark;

pub use models::{PlayerAggregate, RoundWatermark, WatermarkUpdate, RECENT_KEYS_LIMIT};
pub use updater::AggregateUpdater;
pub use watermark::RoundTracker;
