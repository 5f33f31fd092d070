//! Owner identifier sanitization
//!
//! Owner identifiers arrive from an external identity provider and are used
//! verbatim in object-store keys and SQL parameters, so they are reduced to
//! their alphanumeric characters before anything else touches them.

use crate::error::{Result, StageError};

/// Sanitize an externally supplied owner identifier.
///
/// Strips every non-alphanumeric character from the trimmed input. An input
/// with no alphanumeric characters at all cannot identify anyone and is
/// rejected as a client-input error.
pub fn sanitize_user_id(raw: &str) -> Result<String> {
    let sanitized: String = raw.trim().chars().filter(|c| c.is_alphanumeric()).collect();

    if sanitized.is_empty() {
        return Err(StageError::ClientInput(
            "user_id must contain at least one alphanumeric character".to_string(),
        ));
    }

    Ok(sanitized)
}
