use serde::Serialize;

use crate::ledger::{RoundId, ScoreEntry};
use crate::profiles::PlayerProfile;
use crate::stats::PlayerAggregate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserData {
    pub username: String,
    pub name: String,
    pub profile_image_url: String,
}

impl From<&PlayerProfile> for UserData {
    fn from(profile: &PlayerProfile) -> Self {
        Self {
            username: profile.username.clone(),
            name: profile.name.clone(),
            profile_image_url: profile.profile_image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub player_id: String,
    /// Absent until a username batch has mentioned the player.
    pub userdata: Option<UserData>,
    pub score: f64,
    pub max_streak: u32,
    pub total_score: u64,
    pub rounds_played: u32,
}

impl LeaderboardEntry {
    pub fn new(aggregate: PlayerAggregate, profile: Option<&PlayerProfile>) -> Self {
        Self {
            player_id: aggregate.player_id,
            userdata: profile.map(UserData::from),
            score: aggregate.average_score,
            max_streak: aggregate.max_streak,
            total_score: aggregate.total_score,
            rounds_played: aggregate.rounds_played,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundAttempts {
    #[serde(rename = "roundid")]
    pub round_id: RoundId,
    pub best_attempt: u32,
    pub user_count: usize,
}

impl RoundAttempts {
    /// Best (lowest) solved attempt count in a round and how many players hit
    /// it. Failed rounds do not count; `None` if nobody solved it.
    pub fn from_scores(round_id: RoundId, scores: &[ScoreEntry]) -> Option<Self> {
        let solved: Vec<u32> = scores
            .iter()
            .filter_map(ScoreEntry::attempt_count)
            .filter(|attempts| *attempts > 0)
            .collect();
        let best_attempt = solved.iter().copied().min()?;

        Some(Self {
            round_id,
            best_attempt,
            user_count: solved.iter().filter(|a| **a == best_attempt).count(),
        })
    }
}

/// Response body shared by the reporting endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResponse<T> {
    pub data: Vec<T>,
    pub count: usize,
    /// Set when the store failed and this is the last good (or empty) answer.
    pub stale: bool,
}

impl<T> ReportResponse<T> {
    pub fn fresh(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
            stale: false,
        }
    }

    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn empty_stale() -> Self {
        Self {
            data: Vec::new(),
            count: 0,
            stale: true,
        }
    }
}
