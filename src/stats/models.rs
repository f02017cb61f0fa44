use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Running per-player statistics, updated one accepted score at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerAggregate {
    pub player_id: String,
    pub rounds_played: u32,
    pub average_score: f64,
    pub total_score: u64,
    pub current_streak: u32,
    pub max_streak: u32,
    /// Keys of the most recently applied submissions, newest last.
    #[serde(default)]
    pub recent_keys: Vec<String>,
}

/// How many applied submission keys an aggregate remembers.
pub const RECENT_KEYS_LIMIT: usize = 64;

impl PlayerAggregate {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            ..Self::default()
        }
    }

    /// Folds one more round into the running statistics.
    ///
    /// The average is updated incrementally from the previous average, so the
    /// caller must never feed the same round twice.
    pub fn record(&self, score: u8) -> Self {
        let rounds_played = self.rounds_played + 1;
        let average_score = (self.average_score * f64::from(self.rounds_played) + f64::from(score))
            / f64::from(rounds_played);
        let current_streak = if score > 0 {
            self.current_streak + 1
        } else {
            1
        };

        Self {
            player_id: self.player_id.clone(),
            rounds_played,
            average_score,
            total_score: self.total_score + u64::from(score),
            current_streak,
            max_streak: self.max_streak.max(current_streak),
            recent_keys: self.recent_keys.clone(),
        }
    }

    pub fn has_applied(&self, key: &str) -> bool {
        self.recent_keys.iter().any(|k| k == key)
    }

    /// Like [`record`](Self::record), remembering `key` so the same
    /// submission is recognised if it is delivered again.
    pub fn record_keyed(&self, key: &str, score: u8) -> Self {
        let mut next = self.record(score);
        next.recent_keys.push(key.to_string());
        if next.recent_keys.len() > RECENT_KEYS_LIMIT {
            let excess = next.recent_keys.len() - RECENT_KEYS_LIMIT;
            next.recent_keys.drain(..excess);
        }
        next
    }

    /// Leaderboard ordering: best average first, ties broken by max streak and
    /// then total score, finally by player id so the order is stable.
    pub fn leaderboard_order(a: &Self, b: &Self) -> Ordering {
        b.average_score
            .total_cmp(&a.average_score)
            .then_with(|| b.max_streak.cmp(&a.max_streak))
            .then_with(|| b.total_score.cmp(&a.total_score))
            .then_with(|| a.player_id.cmp(&b.player_id))
    }
}

/// Singleton record of the newest round seen by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundWatermark {
    pub latest_round: u64,
    pub updated_at: DateTime<Utc>,
}

impl RoundWatermark {
    pub fn new(latest_round: u64) -> Self {
        Self {
            latest_round,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkUpdate {
    Initialized(u64),
    Advanced { from: u64, to: u64 },
    Unchanged { latest: Option<u64> },
}
