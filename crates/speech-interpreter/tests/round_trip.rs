//! Round-trip properties: spoken(x) parsed back equals x, for every grammar where a
//! canonical spoken form exists.

use proptest::prelude::*;
use shift_speech_interpreter::{action, action::Action, alnum, digits, yesno, Outcome};

const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

const LETTER_WORDS: [&str; 26] = [
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
    "juliett", "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo",
    "sierra", "tango", "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
];

fn spoken_digit(d: u8) -> &'static str {
    DIGIT_WORDS[d as usize]
}

fn spoken_alnum_char(c: char) -> String {
    if c.is_ascii_digit() {
        spoken_digit(c as u8 - b'0').to_string()
    } else {
        LETTER_WORDS[(c as u8 - b'A') as usize].to_string()
    }
}

proptest! {
    #[test]
    fn digit_strings_round_trip(digits_vec in prop::collection::vec(0u8..=9, 1..=6)) {
        let spoken = digits_vec.iter().map(|d| spoken_digit(*d)).collect::<Vec<_>>().join(" ");
        let expected: String = digits_vec.iter().map(|d| char::from(b'0' + d)).collect();
        let out = digits::parse(&spoken, digits_vec.len());
        prop_assert!(matches!(out, Outcome::Parsed(ref p) if p.token == expected));
    }

    #[test]
    fn alnum_codes_round_trip(code in prop::collection::vec(
        prop_oneof![
            (0u8..=9).prop_map(|d| char::from(b'0' + d)),
            (0u8..=25).prop_map(|i| char::from(b'A' + i)),
        ],
        2..=8,
    )) {
        let spoken = code.iter().map(|c| spoken_alnum_char(*c)).collect::<Vec<_>>().join(" ");
        let expected: String = code.iter().collect();
        let out = alnum::parse(&spoken);
        prop_assert!(matches!(out, Outcome::Parsed(ref p) if p.token == expected));
    }
}

#[test]
fn yes_words_round_trip() {
    for word in ["yes", "yeah", "yep", "yup", "correct", "right", "ok", "okay", "sure"] {
        let out = yesno::parse(word);
        assert!(matches!(out, Outcome::Parsed(p) if p.token == yesno::YesNo::Yes));
    }
}

#[test]
fn no_words_round_trip() {
    for word in ["no", "nope", "nah", "incorrect", "wrong"] {
        let out = yesno::parse(word);
        assert!(matches!(out, Outcome::Parsed(p) if p.token == yesno::YesNo::No));
    }
}

#[test]
fn action_words_round_trip() {
    assert!(matches!(action::parse("reschedule"), Outcome::Parsed(p) if p.token == Action::Reschedule));
    assert!(matches!(action::parse("leave it open"), Outcome::Parsed(p) if p.token == Action::Release));
    assert!(matches!(action::parse("speak to an agent"), Outcome::Parsed(p) if p.token == Action::Transfer));
}
