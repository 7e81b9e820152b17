//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted player identifier.
pub const MAX_PLAYER_ID_LEN: usize = 64;
/// Longest accepted answer text.
pub const MAX_ANSWER_LEN: usize = 256;

/// Validates that a player id is non-blank, bounded and free of control characters.
///
/// # Examples
///
/// ```ignore
/// validate_player_id("alice") // Ok
/// validate_player_id("   ")   // Err - blank
/// ```
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        let mut err = ValidationError::new("player_id_blank");
        err.message = Some("Player ID must not be blank".into());
        return Err(err);
    }

    if id.chars().count() > MAX_PLAYER_ID_LEN {
        let mut err = ValidationError::new("player_id_length");
        err.message = Some(
            format!("Player ID must be at most {MAX_PLAYER_ID_LEN} characters").into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_id_format");
        err.message = Some("Player ID must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that an answer carries some text once trimmed.
pub fn validate_answer(answer: &str) -> Result<(), ValidationError> {
    if answer.trim().is_empty() {
        let mut err = ValidationError::new("answer_blank");
        err.message = Some("Answer must not be blank".into());
        return Err(err);
    }

    if answer.chars().count() > MAX_ANSWER_LEN {
        let mut err = ValidationError::new("answer_length");
        err.message = Some(format!("Answer must be at most {MAX_ANSWER_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}
