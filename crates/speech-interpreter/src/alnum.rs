//! `alnum-code-2..8` grammar — job codes spoken as letters and digits.
//!
//! Accepts NATO phonetic letters (with common aliases), digit words, and digit
//! homophones. Whitespace and hyphens are separators. The resolved code must match
//! `[A-Z0-9]{2,8}` or the grammar reports [`Outcome::Unparsable`].

use crate::words::{compound_word_to_digits, word_to_digit, word_to_letter};
use crate::{Outcome, Parsed};

/// Parse `input` as a 2-8 character alphanumeric job code.
pub fn parse(input: &str) -> Outcome<String> {
    let normalized = input.trim().replace('-', " ");
    let mut code = String::new();
    let mut fuzzy_hits = 0usize;

    for raw_tok in normalized.split_whitespace() {
        if let Some(letter) = word_to_letter(raw_tok) {
            code.push(letter);
            continue;
        }
        if let Some(digit) = word_to_digit(raw_tok) {
            code.push((b'0' + digit) as char);
            if matches!(
                raw_tok.to_ascii_lowercase().as_str(),
                "to" | "too" | "for" | "fore" | "ate" | "won" | "niner" | "oh" | "o"
            ) {
                fuzzy_hits += 1;
            }
            continue;
        }
        if let Some((tens, ones)) = compound_word_to_digits(raw_tok) {
            code.push((b'0' + tens) as char);
            code.push((b'0' + ones) as char);
            continue;
        }
        // Not a recognised phonetic word — accept it only as a literal alphanumeric run,
        // e.g. the caller read the whole code at once ("AB12") or spelled a bare digit run.
        if !raw_tok.is_empty() && raw_tok.chars().all(|c| c.is_ascii_alphanumeric()) {
            code.push_str(&raw_tok.to_ascii_uppercase());
            continue;
        }

        return Outcome::Unparsable;
    }

    if code.len() < 2 || code.len() > 8 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Outcome::Unparsable;
    }

    let confidence = if fuzzy_hits == 0 {
        1.0
    } else {
        (1.0 - 0.1 * fuzzy_hits as f32).max(0.6)
    };

    Outcome::Parsed(Parsed::with_confidence(code, confidence))
}
