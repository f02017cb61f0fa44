use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Round identifier exactly as it appeared in the tweet (lower-cased).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(String);

impl RoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the round, tolerating thousands separators ("1,234").
    pub fn number(&self) -> Option<u64> {
        let digits: String = self.0.chars().filter(|c| *c != ',').collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoundId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where a score came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub tweet_id: String,
    pub author_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub round_id: RoundId,
    pub player_id: String,
    pub score: u8,
    /// Raw attempts token, e.g. "3" or "x".
    pub attempts: String,
    pub source: SourceRef,
    pub recorded_at: DateTime<Utc>,
    /// Set once the aggregate and the watermark have taken this submission
    /// into account. An unapplied record is picked up again by the next run.
    #[serde(default)]
    pub applied: bool,
}

impl ScoreEntry {
    pub fn new(
        round_id: RoundId,
        score: u8,
        attempts: impl Into<String>,
        source: SourceRef,
    ) -> Self {
        Self {
            round_id,
            player_id: source.author_id.clone(),
            score,
            attempts: attempts.into(),
            source,
            recorded_at: Utc::now(),
            applied: false,
        }
    }

    /// Identifies this submission to the aggregate, so applying it twice is
    /// a no-op.
    pub fn application_key(&self) -> String {
        format!("{}/{}", self.round_id, self.source.tweet_id)
    }

    pub fn is_same_submission(&self, other: &ScoreEntry) -> bool {
        self.source.tweet_id == other.source.tweet_id
    }

    /// Numeric attempt count, `None` for failed rounds ("x").
    pub fn attempt_count(&self) -> Option<u32> {
        if self.attempts.is_empty() || !self.attempts.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        self.attempts.parse().ok()
    }
}

/// A score document as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredScore {
    pub id: String,
    pub entry: ScoreEntry,
}

/// What happens when a player already has a score for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The first score wins; later ones are rejected.
    #[default]
    KeepFirst,
    /// The latest score overwrites the stored one.
    KeepLatest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Inserted(StoredScore),
    Updated {
        previous: ScoreEntry,
        current: StoredScore,
    },
    /// A record left unapplied by an earlier run; downstream steps are
    /// finished for it instead of rejecting the submission.
    Resumed(StoredScore),
    Rejected(RejectReason),
}

impl SubmitOutcome {
    /// The record downstream aggregates must account for, if any.
    pub fn accepted(&self) -> Option<&StoredScore> {
        match self {
            SubmitOutcome::Inserted(stored) | SubmitOutcome::Resumed(stored) => Some(stored),
            SubmitOutcome::Updated { current, .. } => Some(current),
            SubmitOutcome::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("455", Some(455))]
    #[case("1,234", Some(1234))]
    #[case("#455", None)]
    #[case("", None)]
    #[case(",", None)]
    fn round_number_is_read_leniently(#[case] raw: &str, #[case] expected: Option<u64>) {
        assert_eq!(RoundId::new(raw).number(), expected);
    }

    #[test]
    fn duplicate_policy_parses_kebab_case() {
        assert_eq!(
            DuplicatePolicy::from_str("keep-latest").unwrap(),
            DuplicatePolicy::KeepLatest
        );
        assert_eq!(DuplicatePolicy::default().to_string(), "keep-first");
        assert!(DuplicatePolicy::from_str("keep-both").is_err());
    }

    #[test]
    fn failed_rounds_have_no_attempt_count() {
        let source = SourceRef {
            tweet_id: "t1".into(),
            author_id: "u1".into(),
        };
        let failed = ScoreEntry::new(RoundId::new("455"), 0, "x", source.clone());
        let solved = ScoreEntry::new(RoundId::new("455"), 4, "3", source);

        assert_eq!(failed.attempt_count(), None);
        assert_eq!(solved.attempt_count(), Some(3));
        assert_eq!(solved.player_id, "u1");
    }

    #[test]
    fn application_key_names_round_and_tweet() {
        let entry = ScoreEntry::new(
            RoundId::new("455"),
            5,
            "2",
            SourceRef {
                tweet_id: "t1".into(),
                author_id: "u1".into(),
            },
        );

        assert_eq!(entry.application_key(), "455/t1");
        assert!(!entry.applied);
    }
}
