//! Post body rules

use thiserror::Error;

/// Maximum post length, in characters
pub const MAX_POST_LENGTH: usize = 140;

const PROFANITIES: [&str; 3] = ["kerfuffle", "sharbert", "fornax"];
const CENSOR_MASK: &str = "****";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostError {
    #[error("body cannot be empty")]
    Empty,

    #[error("Chirp is too long")]
    TooLong,
}

/// Validate a post body and return it with profanities masked
pub fn prepare_body(body: &str) -> Result<String, PostError> {
    if body.trim().is_empty() {
        return Err(PostError::Empty);
    }
    if body.chars().count() > MAX_POST_LENGTH {
        return Err(PostError::TooLong);
    }
    Ok(censor(body))
}

/// Replace whole words matching a profanity (case-insensitive) with `****`.
/// Words with attached punctuation are left alone.
pub fn censor(body: &str) -> String {
    body.split(' ')
        .map(|word| {
            let lower = word.to_lowercase();
            if PROFANITIES.contains(&lower.as_str()) {
                CENSOR_MASK
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
