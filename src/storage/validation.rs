//! Input rules applied before anything is written.
//!
//! Lengths are counted in characters, after trimming. Validators return the normalized value
//! that should be stored.

use crate::error::ValidationError;

pub const FRONT_MAX_CHARS: usize = 500;
pub const BACK_MAX_CHARS: usize = 2000;
pub const DECK_NAME_MAX_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 200;

const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn required<'a>(field: &'static str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed)
}

/// Front and back text, trimmed.
pub fn validate_flashcard(front: &str, back: &str) -> Result<(String, String), ValidationError> {
    let front = required("front text", front, FRONT_MAX_CHARS)?;
    let back = required("back text", back, BACK_MAX_CHARS)?;
    Ok((front.to_string(), back.to_string()))
}

/// Deck name, trimmed. Rejects `<>:"/\|?*`.
pub fn validate_deck_name(name: &str) -> Result<String, ValidationError> {
    let name = required("deck name", name, DECK_NAME_MAX_CHARS)?;
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(ValidationError::InvalidCharacters { field: "deck name" });
    }
    Ok(name.to_string())
}

/// Optional description; blank becomes `None`.
pub fn validate_description(description: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::TooLong { field: "description", max: DESCRIPTION_MAX_CHARS });
    }
    Ok(Some(description.to_string()))
}

/// Optional `#RGB` / `#RRGGBB` color; blank becomes `None`.
pub fn validate_color(color: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(color) = color.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let valid = match color.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    };
    if !valid {
        return Err(ValidationError::InvalidColor { value: color.to_string() });
    }
    Ok(Some(color.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flashcard_trims_and_caps() {
        assert_eq!(
            validate_flashcard("  hola ", "\thello\n").unwrap(),
            ("hola".to_string(), "hello".to_string())
        );
        assert_eq!(
            validate_flashcard("   ", "x").unwrap_err(),
            ValidationError::Required { field: "front text" }
        );
        assert_eq!(
            validate_flashcard("a", &"b".repeat(2001)).unwrap_err(),
            ValidationError::TooLong { field: "back text", max: 2000 }
        );
        // counted in characters, not bytes
        assert!(validate_flashcard(&"ñ".repeat(500), "x").is_ok());
    }

    #[test]
    fn deck_name_rules() {
        assert_eq!(validate_deck_name("  Verbs ").unwrap(), "Verbs");
        assert_eq!(
            validate_deck_name("").unwrap_err(),
            ValidationError::Required { field: "deck name" }
        );
        assert!(matches!(
            validate_deck_name(&"x".repeat(51)),
            Err(ValidationError::TooLong { max: 50, .. })
        ));
        for bad in ["a/b", "what?", "x*y", "<tag>", "c:d", "pipe|", "quote\"", "back\\slash"] {
            assert_eq!(
                validate_deck_name(bad).unwrap_err(),
                ValidationError::InvalidCharacters { field: "deck name" },
                "{bad}"
            );
        }
    }

    #[test]
    fn description_blank_is_absent() {
        assert_eq!(validate_description(None).unwrap(), None);
        assert_eq!(validate_description(Some("   ")).unwrap(), None);
        assert_eq!(validate_description(Some(" food ")).unwrap().as_deref(), Some("food"));
        assert!(validate_description(Some(&"d".repeat(201))).is_err());
    }

    #[test]
    fn color_formats() {
        assert_eq!(validate_color(Some("#007AFF")).unwrap().as_deref(), Some("#007AFF"));
        assert_eq!(validate_color(Some("#fff")).unwrap().as_deref(), Some("#fff"));
        assert_eq!(validate_color(Some("")).unwrap(), None);
        for bad in ["007AFF", "#12345", "#GGGGGG", "#1234567", "blue"] {
            assert!(matches!(
                validate_color(Some(bad)),
                Err(ValidationError::InvalidColor { .. })
            ), "{bad}");
        }
    }
}
