use super::IngestError;

pub const MAX_ATTEMPTS: u64 = 6;

/// Maps an attempts token to a score between 0 and 6.
///
/// Anything that is not purely ASCII digits ("x", "-1", "") is a failed round
/// and scores 0. Digit strings must be in `1..=6`; one attempt is worth 6
/// points and six attempts 1 point. `"0"` and anything above 6 are errors, not
/// zero scores.
pub fn calculate_score(attempts: &str) -> Result<u8, IngestError> {
    if attempts.is_empty() || !attempts.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(0);
    }

    // Only overflow can fail here; such a value is out of range anyway.
    let count: u64 = attempts.parse().unwrap_or(u64::MAX);
    if !(1..=MAX_ATTEMPTS).contains(&count) {
        return Err(IngestError::OutOfRangeAttempts(count));
    }

    Ok((MAX_ATTEMPTS + 1 - count) as u8)
}
