//! `digits-of-length-N` grammar.
//!
//! Accepts literal digits, phonetic number words ("zero".."nine"), two-digit compounds
//! ("twelve", "thirty-four"), and digit homophones ("to"->2, "for"->4, "ate"->8, "won"->1,
//! "niner"->9). The output length must equal `n` exactly or the grammar reports
//! [`Outcome::Unparsable`].

use crate::words::{compound_word_to_digits, word_to_digit};
use crate::{Outcome, Parsed};
use nom::character::complete::{alpha1, digit1, multispace1};
use nom::combinator::map;
use nom::multi::separated_list1;
use nom::IResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Word(&'a str),
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    nom::branch::alt((
        map(digit1, Token::Literal),
        map(alpha1, Token::Word),
    ))(input)
}

fn tokens(input: &str) -> IResult<&str, Vec<Token<'_>>> {
    separated_list1(multispace1, token)(input)
}

/// Parse `input` as exactly `n` digits. Returns [`Outcome::Unparsable`] if the input
/// doesn't resolve to exactly `n` digits, whatever mix of words and literals is used.
pub fn parse(input: &str, n: usize) -> Outcome<String> {
    let normalized = input.trim().replace(['-', ','], " ");
    let Ok((rest, toks)) = tokens(normalized.trim()) else {
        return Outcome::Unparsable;
    };
    if !rest.trim().is_empty() {
        return Outcome::Unparsable;
    }

    let mut digits = String::new();
    let mut homophone_hits = 0usize;

    for tok in toks {
        match tok {
            Token::Literal(s) => {
                digits.push_str(s);
            }
            Token::Word(w) => {
                if let Some(d) = word_to_digit(w) {
                    digits.push((b'0' + d) as char);
                    if matches!(
                        w.to_ascii_lowercase().as_str(),
                        "to" | "too" | "for" | "fore" | "ate" | "won" | "niner" | "oh" | "o"
                    ) {
                        homophone_hits += 1;
                    }
                } else if let Some((tens, ones)) = compound_word_to_digits(w) {
                    digits.push((b'0' + tens) as char);
                    digits.push((b'0' + ones) as char);
                } else {
                    return Outcome::Unparsable;
                }
            }
        }
    }

    if digits.len() != n {
        return Outcome::Unparsable;
    }

    let confidence = if homophone_hits == 0 {
        1.0
    } else {
        (1.0 - 0.08 * homophone_hits as f32).max(0.6)
    };

    Outcome::Parsed(Parsed::with_confidence(digits, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_digits() {
        let out = parse("1234", 4);
        assert_eq!(out, Outcome::Parsed(Parsed::confident("1234".to_string())));
    }

    #[test]
    fn phonetic_words() {
        let out = parse("one two three four", 4);
        assert!(matches!(out, Outcome::Parsed(p) if p.token == "1234"));
    }

    #[test]
    fn homophones() {
        let out = parse("won to for ate", 4);
        assert!(matches!(out, Outcome::Parsed(p) if p.token == "1248" && p.confidence < 1.0));
    }

    #[test]
    fn compounds_contribute_two_digits() {
        let out = parse("twelve thirty four", 4);
        assert!(matches!(out, Outcome::Parsed(p) if p.token == "1234"));
    }

    #[test]
    fn wrong_length_is_unparsable() {
        assert_eq!(parse("one two three", 4), Outcome::Unparsable);
        assert_eq!(parse("one two three four five", 4), Outcome::Unparsable);
    }

    #[test]
    fn pin_rejects_non_four_lengths() {
        assert_eq!(parse("one two three", 4), Outcome::Unparsable);
    }

    #[test]
    fn round_trip_digit_words() {
        for d in 0u8..=9 {
            let word = match d {
                0 => "zero",
                1 => "one",
                2 => "two",
                3 => "three",
                4 => "four",
                5 => "five",
                6 => "six",
                7 => "seven",
                8 => "eight",
                9 => "nine",
                _ => unreachable!(),
            };
            let out = parse(word, 1);
            assert!(matches!(out, Outcome::Parsed(p) if p.token == d.to_string()));
        }
    }
}
