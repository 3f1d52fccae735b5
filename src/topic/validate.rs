// Topic and topic-filter validation, MQTT 3.1.1 section 4.7.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateError {
    InvalidLength,
    InvalidUtf8,
    WildcardNotAllowed,
    InvalidWildcardLocation,
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidLength => "topic must not be empty",
            Self::InvalidUtf8 => "topic must be valid UTF-8 without embedded NUL",
            Self::WildcardNotAllowed => "wildcards are not allowed in a topic name",
            Self::InvalidWildcardLocation => {
                "'#' must be the last level and wildcards must occupy a whole level"
            }
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ValidateError {}

/// Validates `topic` as either a publish topic name (`allow_wildcard =
/// false`) or a subscription topic filter (`allow_wildcard = true`).
pub fn validate(topic: &str, allow_wildcard: bool) -> Result<(), ValidateError> {
    if topic.is_empty() {
        return Err(ValidateError::InvalidLength);
    }
    if topic.contains('\u{0}') {
        return Err(ValidateError::InvalidUtf8);
    }

    let parts: Vec<&str> = topic.split('/').collect();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.contains('#') || part.contains('+') {
            if !allow_wildcard {
                return Err(ValidateError::WildcardNotAllowed);
            }
            if *part == "#" {
                if i != last {
                    return Err(ValidateError::InvalidWildcardLocation);
                }
            } else if *part != "+" {
                return Err(ValidateError::InvalidWildcardLocation);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_topic() {
        assert_eq!(validate("", true), Err(ValidateError::InvalidLength));
    }

    #[test]
    fn rejects_embedded_nul() {
        assert_eq!(validate("a/\u{0}/b", true), Err(ValidateError::InvalidUtf8));
    }

    #[test]
    fn rejects_wildcard_in_plain_topic() {
        assert_eq!(
            validate("a/+/b", false),
            Err(ValidateError::WildcardNotAllowed)
        );
    }

    #[test]
    fn hash_must_be_last_level() {
        assert_eq!(
            validate("a/#/b", true),
            Err(ValidateError::InvalidWildcardLocation)
        );
        assert!(validate("a/b/#", true).is_ok());
        assert!(validate("#", true).is_ok());
    }

    #[test]
    fn wildcard_must_occupy_whole_level() {
        assert_eq!(
            validate("a/b+/c", true),
            Err(ValidateError::InvalidWildcardLocation)
        );
        assert!(validate("a/+/c", true).is_ok());
    }
}
