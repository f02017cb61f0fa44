use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    AggregateRepository, MetadataRepository, ProfileRepository, ScoreRepository, StoreError,
    Versioned,
};
use crate::ledger::{RoundId, ScoreEntry, SourceRef, StoredScore};
use crate::profiles::{PlayerProfile, UpsertOutcome};
use crate::stats::{PlayerAggregate, RoundWatermark};

const ROUNDS_DOC_ID: &str = "rounds";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS scores (
        id TEXT PRIMARY KEY,
        round_id TEXT NOT NULL,
        round_number BIGINT,
        player_id TEXT NOT NULL,
        score SMALLINT NOT NULL,
        attempts TEXT NOT NULL,
        tweet_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        applied BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "ALTER TABLE scores ADD COLUMN IF NOT EXISTS applied BOOLEAN NOT NULL DEFAULT FALSE",
    "DROP INDEX IF EXISTS scores_round_player_idx",
    "CREATE UNIQUE INDEX IF NOT EXISTS scores_round_player_key ON scores (round_id, player_id)",
    "CREATE TABLE IF NOT EXISTS player_aggregates (
        player_id TEXT PRIMARY KEY,
        rounds_played BIGINT NOT NULL,
        average_score DOUBLE PRECISION NOT NULL,
        total_score BIGINT NOT NULL,
        current_streak BIGINT NOT NULL,
        max_streak BIGINT NOT NULL,
        recent_keys TEXT[] NOT NULL DEFAULT '{}',
        version BIGINT NOT NULL
    )",
    "ALTER TABLE player_aggregates ADD COLUMN IF NOT EXISTS recent_keys TEXT[] NOT NULL DEFAULT '{}'",
    "CREATE TABLE IF NOT EXISTS metadata (
        id TEXT PRIMARY KEY,
        latest_round BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS player_profiles (
        player_id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        name TEXT NOT NULL,
        profile_image_url TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
];

/// PostgreSQL-backed document store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables this store needs if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Database(format!("{column} overflows BIGINT")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Database(format!("{column} is negative")))
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Database(format!("{column} out of range")))
}

fn score_from_row(row: &PgRow) -> Result<ScoreEntry, StoreError> {
    let score: i16 = row.try_get("score")?;
    Ok(ScoreEntry {
        round_id: RoundId::new(row.try_get::<String, _>("round_id")?),
        player_id: row.try_get("player_id")?,
        score: u8::try_from(score)
            .map_err(|_| StoreError::Database(format!("score {score} out of range")))?,
        attempts: row.try_get("attempts")?,
        source: SourceRef {
            tweet_id: row.try_get("tweet_id")?,
            author_id: row.try_get("author_id")?,
        },
        recorded_at: row.try_get("recorded_at")?,
        applied: row.try_get("applied")?,
    })
}

fn aggregate_from_row(row: &PgRow) -> Result<Versioned<PlayerAggregate>, StoreError> {
    Ok(Versioned {
        value: PlayerAggregate {
            player_id: row.try_get("player_id")?,
            rounds_played: to_u32(row.try_get("rounds_played")?, "rounds_played")?,
            average_score: row.try_get("average_score")?,
            total_score: to_u64(row.try_get("total_score")?, "total_score")?,
            current_streak: to_u32(row.try_get("current_streak")?, "current_streak")?,
            max_streak: to_u32(row.try_get("max_streak")?, "max_streak")?,
            recent_keys: row.try_get("recent_keys")?,
        },
        version: to_u64(row.try_get("version")?, "version")?,
    })
}

#[async_trait]
impl ScoreRepository for PostgresStore {
    #[instrument(skip(self))]
    async fn find_scores(
        &self,
        round_id: &RoundId,
        player_id: &str,
    ) -> Result<Vec<StoredScore>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, round_id, player_id, score, attempts, tweet_id, author_id, recorded_at, applied
             FROM scores WHERE round_id = $1 AND player_id = $2 ORDER BY recorded_at",
        )
        .bind(round_id.as_str())
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to query scores");
            StoreError::from(e)
        })?;

        rows.iter()
            .map(|row| -> Result<StoredScore, StoreError> {
                Ok(StoredScore {
                    id: row.try_get("id")?,
                    entry: score_from_row(row)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, entry), fields(round_id = %entry.round_id, player_id = %entry.player_id))]
    async fn insert_score(&self, entry: &ScoreEntry) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let round_number = entry
            .round_id
            .number()
            .map(|n| to_i64(n, "round_number"))
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO scores (id, round_id, round_number, player_id, score, attempts, tweet_id, author_id, recorded_at, applied)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (round_id, player_id) DO NOTHING",
        )
        .bind(&id)
        .bind(entry.round_id.as_str())
        .bind(round_number)
        .bind(&entry.player_id)
        .bind(i16::from(entry.score))
        .bind(&entry.attempts)
        .bind(&entry.source.tweet_id)
        .bind(&entry.source.author_id)
        .bind(entry.recorded_at)
        .bind(entry.applied)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Score already recorded for pair in database");
            return Err(StoreError::Conflict(format!(
                "round {} already has a score for {}",
                entry.round_id, entry.player_id
            )));
        }
        debug!(score_id = %id, "Score inserted in database");
        Ok(id)
    }

    #[instrument(skip(self, entry))]
    async fn replace_score(&self, id: &str, entry: &ScoreEntry) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE scores SET score = $2, attempts = $3, tweet_id = $4, author_id = $5, recorded_at = $6,
                 applied = $7
             WHERE id = $1",
        )
        .bind(id)
        .bind(i16::from(entry.score))
        .bind(&entry.attempts)
        .bind(&entry.source.tweet_id)
        .bind(&entry.source.author_id)
        .bind(entry.recorded_at)
        .bind(entry.applied)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(score_id = %id, "Score not found for replace in database");
            return Err(StoreError::NotFound(format!("score {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_applied(&self, id: &str, tweet_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE scores SET applied = TRUE WHERE id = $1 AND tweet_id = $2")
            .bind(id)
            .bind(tweet_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(score_id = %id, "Score was replaced before it could be marked");
        }
        Ok(())
    }

    async fn recent_rounds(&self, limit: usize) -> Result<Vec<RoundId>, StoreError> {
        let rows = sqlx::query(
            "SELECT round_id FROM scores GROUP BY round_id
             ORDER BY MAX(round_number) DESC NULLS LAST, round_id DESC LIMIT $1",
        )
        .bind(to_i64(limit as u64, "limit")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RoundId, StoreError> {
                Ok(RoundId::new(row.try_get::<String, _>("round_id")?))
            })
            .collect()
    }

    async fn scores_for_round(&self, round_id: &RoundId) -> Result<Vec<ScoreEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT round_id, player_id, score, attempts, tweet_id, author_id, recorded_at, applied
             FROM scores WHERE round_id = $1",
        )
        .bind(round_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(score_from_row).collect()
    }
}

#[async_trait]
impl AggregateRepository for PostgresStore {
    async fn get_aggregate(
        &self,
        player_id: &str,
    ) -> Result<Option<Versioned<PlayerAggregate>>, StoreError> {
        let row = sqlx::query(
            "SELECT player_id, rounds_played, average_score, total_score, current_streak, max_streak, recent_keys, version
             FROM player_aggregates WHERE player_id = $1",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(aggregate_from_row).transpose()
    }

    #[instrument(skip(self, aggregate), fields(player_id = %aggregate.player_id))]
    async fn compare_and_swap_aggregate(
        &self,
        aggregate: &PlayerAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let (query, version) = match expected_version {
            None => (
                "INSERT INTO player_aggregates
                    (player_id, rounds_played, average_score, total_score, current_streak, max_streak, version, recent_keys)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (player_id) DO NOTHING",
                1,
            ),
            Some(expected) => (
                "UPDATE player_aggregates
                 SET rounds_played = $2, average_score = $3, total_score = $4,
                     current_streak = $5, max_streak = $6, version = $7, recent_keys = $8
                 WHERE player_id = $1 AND version = $9",
                expected + 1,
            ),
        };

        let mut statement = sqlx::query(query)
            .bind(&aggregate.player_id)
            .bind(i64::from(aggregate.rounds_played))
            .bind(aggregate.average_score)
            .bind(to_i64(aggregate.total_score, "total_score")?)
            .bind(i64::from(aggregate.current_streak))
            .bind(i64::from(aggregate.max_streak))
            .bind(to_i64(version, "version")?)
            .bind(&aggregate.recent_keys);
        if let Some(expected) = expected_version {
            statement = statement.bind(to_i64(expected, "version")?);
        }
        let result = statement.execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            debug!(?expected_version, "Aggregate version mismatch in database");
            return Err(StoreError::Conflict(format!(
                "aggregate {} changed since version {:?}",
                aggregate.player_id, expected_version
            )));
        }
        Ok(version)
    }

    async fn top_aggregates(&self, limit: usize) -> Result<Vec<PlayerAggregate>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id, rounds_played, average_score, total_score, current_streak, max_streak, recent_keys, version
             FROM player_aggregates
             ORDER BY average_score DESC, max_streak DESC, total_score DESC, player_id ASC
             LIMIT $1",
        )
        .bind(to_i64(limit as u64, "limit")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| aggregate_from_row(row).map(|versioned| versioned.value))
            .collect()
    }
}

#[async_trait]
impl MetadataRepository for PostgresStore {
    async fn get_watermark(&self) -> Result<Option<RoundWatermark>, StoreError> {
        let row = sqlx::query("SELECT latest_round, updated_at FROM metadata WHERE id = $1")
            .bind(ROUNDS_DOC_ID)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<RoundWatermark, StoreError> {
            Ok(RoundWatermark {
                latest_round: to_u64(row.try_get("latest_round")?, "latest_round")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn compare_and_set_watermark(
        &self,
        expected: Option<u64>,
        latest_round: u64,
    ) -> Result<RoundWatermark, StoreError> {
        let watermark = RoundWatermark::new(latest_round);
        let query = match expected {
            None => {
                "INSERT INTO metadata (id, latest_round, updated_at) VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO NOTHING"
            }
            Some(_) => {
                "UPDATE metadata SET latest_round = $2, updated_at = $3
                 WHERE id = $1 AND latest_round = $4"
            }
        };

        let mut statement = sqlx::query(query)
            .bind(ROUNDS_DOC_ID)
            .bind(to_i64(latest_round, "latest_round")?)
            .bind(watermark.updated_at);
        if let Some(expected) = expected {
            statement = statement.bind(to_i64(expected, "latest_round")?);
        }
        let result = statement.execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "watermark changed, expected {expected:?}"
            )));
        }
        Ok(watermark)
    }
}

#[async_trait]
impl ProfileRepository for PostgresStore {
    #[instrument(skip(self, profile), fields(player_id = %profile.player_id))]
    async fn upsert_profile(&self, profile: &PlayerProfile) -> Result<UpsertOutcome, StoreError> {
        let row = sqlx::query(
            "INSERT INTO player_profiles (player_id, username, name, profile_image_url, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (player_id) DO UPDATE
             SET username = EXCLUDED.username, name = EXCLUDED.name,
                 profile_image_url = EXCLUDED.profile_image_url, updated_at = EXCLUDED.updated_at
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&profile.player_id)
        .bind(&profile.username)
        .bind(&profile.name)
        .bind(&profile.profile_image_url)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get_profiles(
        &self,
        player_ids: &[String],
    ) -> Result<HashMap<String, PlayerProfile>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id, username, name, profile_image_url, updated_at
             FROM player_profiles WHERE player_id = ANY($1)",
        )
        .bind(player_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, PlayerProfile), StoreError> {
                let profile = PlayerProfile {
                    player_id: row.try_get("player_id")?,
                    username: row.try_get("username")?,
                    name: row.try_get("name")?,
                    profile_image_url: row.try_get("profile_image_url")?,
                    updated_at: row.try_get("updated_at")?,
                };
                Ok((profile.player_id.clone(), profile))
            })
            .collect()
    }
}
