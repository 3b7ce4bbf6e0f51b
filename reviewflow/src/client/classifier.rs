//! Status response classification.

use crate::core::{CheckOutcome, StatusCheckResult};
use crate::envelope::Envelope;

/// Classifies a raw status response body.
///
/// Unparseable input, or an envelope without a parseable body, is
/// [`CheckOutcome::Malformed`]. Well-formed input with an unexpected or
/// missing status is [`CheckOutcome::Unknown`]. Status strings are matched
/// case-sensitively. Never panics.
///
/// A JSON document with no `body`, such as a gateway `{"message":"Forbidden"}`,
/// has no status payload to inspect and is reported as malformed. The poll
/// loop treats malformed and unknown checks the same way.
#[must_use]
pub fn classify(raw: &str) -> StatusCheckResult {
    let Ok(envelope) = Envelope::parse(raw) else {
        return StatusCheckResult::malformed(raw);
    };

    let outcome = match envelope.body_str("status") {
        Some("SUCCEEDED") => CheckOutcome::Succeeded,
        Some("FAILED") => CheckOutcome::Failed,
        Some("RUNNING" | "IN_PROGRESS") => CheckOutcome::Pending,
        _ => CheckOutcome::Unknown,
    };

    StatusCheckResult {
        outcome,
        payload: Some(envelope.body),
        raw: raw.to_string(),
    }
}
