use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player display data as delivered in a username batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "profileImageUrl")]
    pub profile_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: String,
    pub username: String,
    pub name: String,
    pub profile_image_url: String,
    pub updated_at: DateTime<Utc>,
}

impl PlayerProfile {
    pub fn from_raw(player_id: impl Into<String>, raw: RawProfile) -> Self {
        Self {
            player_id: player_id.into(),
            username: raw.username,
            name: raw.name,
            profile_image_url: raw.profile_image_url,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}
