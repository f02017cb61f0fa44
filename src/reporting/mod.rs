pub mod handlers;
pub mod models;
pub mod service;

pub use handlers::router;
pub use models::{LeaderboardEntry, ReportResponse, RoundAttempts, UserData};
pub use service::{ReportingService, LEADERBOARD_LIMIT, RECENT_ROUNDS_LIMIT};
