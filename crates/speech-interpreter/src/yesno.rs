//! `yes-no` grammar — a closed canonical vocabulary, no fuzzy matching.

use crate::{Outcome, Parsed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

const YES_WORDS: &[&str] = &["yes", "yeah", "yep", "yup", "correct", "right", "ok", "okay", "sure"];
const NO_WORDS: &[&str] = &["no", "nope", "nah", "incorrect", "wrong"];

/// Parse `input` as a yes/no response. Anything outside the canonical lists is
/// [`Outcome::Unparsable`] — there is no partial credit for yes/no.
pub fn parse(input: &str) -> Outcome<YesNo> {
    let normalized = input.trim().to_ascii_lowercase();
    let word = normalized
        .trim_end_matches(|c: char| c == '.' || c == '!')
        .trim();

    if YES_WORDS.contains(&word) {
        Outcome::Parsed(Parsed::confident(YesNo::Yes))
    } else if NO_WORDS.contains(&word) {
        Outcome::Parsed(Parsed::confident(YesNo::No))
    } else {
        Outcome::Unparsable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yeah_is_yes() {
        assert_eq!(parse("yeah"), Outcome::Parsed(Parsed::confident(YesNo::Yes)));
    }

    #[test]
    fn nope_is_no() {
        assert_eq!(parse("nope"), Outcome::Parsed(Parsed::confident(YesNo::No)));
    }

    #[test]
    fn unrecognised_is_unparsable() {
        assert_eq!(parse("maybe"), Outcome::Unparsable);
    }
}
