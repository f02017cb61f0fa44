use super::{AttemptRecord, IngestError, RawEntry};
use crate::ledger::RoundId;

/// Pulls the round and attempts out of a result tweet such as
/// `"Wordle 455 2/6\n\n⬛🟩..."`.
///
/// The text is lower-cased and split on single spaces. The second term is the
/// round; the third term must contain a `/` and everything before it is the
/// attempts token (`"2"`, or `"x"` for a failed round).
pub fn parse_entry(entry: &RawEntry) -> Result<AttemptRecord, IngestError> {
    let text = entry.tweet.to_lowercase();
    let terms: Vec<&str> = text.split(' ').collect();

    if terms.len() < 3 {
        return Err(IngestError::MalformedEntry(format!(
            "expected at least 3 terms, found {}",
            terms.len()
        )));
    }

    let round = terms[1];
    if round.is_empty() {
        return Err(IngestError::MalformedEntry(
            "round identifier is empty".to_string(),
        ));
    }

    let (attempts, _) = terms[2].split_once('/').ok_or_else(|| {
        IngestError::MalformedEntry(format!("no attempts fraction in {:?}", terms[2]))
    })?;

    Ok(AttemptRecord {
        round_id: RoundId::new(round),
        attempts: attempts.to_string(),
        source: entry.source(),
    })
}
