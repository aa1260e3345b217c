//! Australian phone-number normalisation.
//!
//! One canonical form (`+61XXXXXXXXX`) is stored and compared everywhere; no component
//! compares raw caller-supplied strings. Normalisation is idempotent: `norm(norm(x)) =
//! norm(x)`.

use crate::error::PhoneError;

/// Normalise a phone number to `+61XXXXXXXXX`.
///
/// Accepts `0XXXXXXXXX`, `+61XXXXXXXXX`, and the same with spaces/parens/hyphens
/// interspersed. Mobile numbers (`04...`) and landlines with area-code prefixes
/// `2`/`3`/`7`/`8` are accepted; anything else is rejected.
pub fn normalise(raw: &str) -> Result<String, PhoneError> {
    let digits_only: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let national_digits = if let Some(rest) = digits_only.strip_prefix("+61") {
        rest.to_string()
    } else if let Some(rest) = digits_only.strip_prefix('0') {
        rest.to_string()
    } else if digits_only.len() == 9 {
        // Already bare national-significant-number form, no leading 0/+61.
        digits_only.clone()
    } else {
        return Err(PhoneError::InvalidNumber(raw.to_string()));
    };

    if national_digits.len() != 9 || !national_digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneError::InvalidNumber(raw.to_string()));
    }

    let first = national_digits.chars().next().unwrap();
    let valid_prefix = matches!(first, '4' | '2' | '3' | '7' | '8');
    if !valid_prefix {
        return Err(PhoneError::InvalidNumber(raw.to_string()));
    }

    Ok(format!("+61{national_digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_with_leading_zero() {
        assert_eq!(normalise("0491570006").unwrap(), "+61491570006");
    }

    #[test]
    fn mobile_already_e164() {
        assert_eq!(normalise("+61491570006").unwrap(), "+61491570006");
    }

    #[test]
    fn formatted_with_spaces_and_parens() {
        assert_eq!(normalise("(04) 9157 0006").unwrap(), "+61491570006");
    }

    #[test]
    fn landline_prefixes() {
        for prefix in ["02", "03", "07", "08"] {
            let raw = format!("{prefix}91234567");
            let normalised = normalise(&raw).unwrap();
            assert!(normalised.starts_with("+61"));
        }
    }

    #[test]
    fn invalid_prefix_rejected() {
        assert!(normalise("0191570006").is_err());
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(normalise("049157000").is_err());
        assert!(normalise("04915700066").is_err());
    }

    #[test]
    fn normalisation_is_idempotent() {
        let once = normalise("0491570006").unwrap();
        let twice = normalise(&once).unwrap();
        assert_eq!(once, twice);
    }
}
