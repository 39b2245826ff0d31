//! Identity normalization for phone numbers and emails.
//!
//! Message stores and contact exports spell the same phone number in many
//! ways (`+1 (555) 123-4567`, `555-123-4567`, `15551234567`). Both sides of the
//! join go through [`normalize`] so they share one key space.
//!
//! The canonical form of a phone number is digits only, with a leading country
//! code digit. Numbers of ten digits or fewer are treated as national-format US
//! numbers and receive a `1` prefix. Anything that is not purely digits (emails,
//! alphanumeric sender IDs) keeps its spelling, minus the stripped characters.

/// Characters removed from every identifier.
#[inline]
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '(' | ')')
}

/// Longest digit string treated as missing its country code.
pub const NATIONAL_NUMBER_MAX_DIGITS: usize = 10;

/// Default country code prepended to national-format numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "1";

/// Canonicalize an identifier.
///
/// ```
/// use imsg::normalize::normalize;
///
/// assert_eq!(normalize("(555) 123-4567"), "15551234567");
/// assert_eq!(normalize("+1 555 123 4567"), "15551234567");
/// assert_eq!(normalize("friend@example.com"), "friend@example.com");
/// ```
#[must_use]
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|&c| !is_separator(c)).collect();

    match phone_digits(&stripped) {
        Some(digits) if digits.len() <= NATIONAL_NUMBER_MAX_DIGITS => {
            format!("{DEFAULT_COUNTRY_CODE}{digits}")
        }
        Some(digits) => digits.to_string(),
        None => stripped,
    }
}

/// Whether an identifier looks like a phone number once separators are gone.
#[must_use]
pub fn is_phone_like(raw: &str) -> bool {
    let stripped: String = raw.chars().filter(|&c| !is_separator(c)).collect();
    phone_digits(&stripped).is_some()
}

fn phone_digits(stripped: &str) -> Option<&str> {
    let digits = stripped.strip_prefix('+').unwrap_or(stripped);
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        assert_eq!(normalize("(555) 123-4567"), "15551234567");
        assert_eq!(normalize("555 123\t4567"), "15551234567");
    }

    #[test]
    fn prepends_exactly_one_country_digit_to_short_numbers() {
        for input in ["5551234567", "1234567890", "12345", "7"] {
            assert_eq!(normalize(input), format!("1{input}"));
        }
    }

    #[test]
    fn eleven_digits_unchanged() {
        assert_eq!(normalize("15551234567"), "15551234567");
        assert_eq!(normalize("44207946095"), "44207946095");
    }

    #[test]
    fn plus_prefix_joins_the_digit_key_space() {
        assert_eq!(normalize("+15551234567"), "15551234567");
        assert_eq!(normalize("+44 20 7946 0958"), "442079460958");
        assert_eq!(normalize("+1 (555) 123-4567"), normalize("555-123-4567"));
    }

    #[test]
    fn emails_pass_through_without_case_change() {
        assert_eq!(normalize("Friend@Example.com"), "Friend@Example.com");
        assert_eq!(normalize(" first-last@example.com "), "firstlast@example.com");
        assert_eq!(normalize("+friend@example.com"), "+friend@example.com");
    }

    #[test]
    fn empty_and_punctuation_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" - ( ) "), "");
        assert_eq!(normalize("+"), "+");
    }

    #[test]
    fn idempotent_on_realistic_identifiers() {
        for input in [
            "(555) 123-4567",
            "+1 555 123 4567",
            "15551234567",
            "+44 20 7946 0958",
            "friend@example.com",
            "Alice Shortcode",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn phone_like_detection() {
        assert!(is_phone_like("+1 (555) 123-4567"));
        assert!(!is_phone_like("friend@example.com"));
        assert!(!is_phone_like(""));
    }
}
