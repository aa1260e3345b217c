//! `action-choice` grammar — which of the three top-level call intents the caller wants.

use crate::{Outcome, Parsed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Reschedule,
    Release,
    Transfer,
}

const RESCHEDULE_WORDS: &[&str] = &["reschedule", "change", "move"];
const RELEASE_WORDS: &[&str] = &["open", "leave open", "cancel", "can't make it", "cant make it"];
const TRANSFER_WORDS: &[&str] = &["person", "rep", "representative", "human", "agent"];

/// Parse `input` as one of the three call intents. Matching is substring-based since
/// callers phrase the same intent many ways ("I need to change it", "can you move my
/// shift").
pub fn parse(input: &str) -> Outcome<Action> {
    let normalized = input.trim().to_ascii_lowercase();

    if RESCHEDULE_WORDS.iter().any(|w| normalized.contains(w)) {
        return Outcome::Parsed(Parsed::confident(Action::Reschedule));
    }
    if RELEASE_WORDS.iter().any(|w| normalized.contains(w)) {
        return Outcome::Parsed(Parsed::confident(Action::Release));
    }
    if TRANSFER_WORDS.iter().any(|w| normalized.contains(w)) {
        return Outcome::Parsed(Parsed::confident(Action::Transfer));
    }
    Outcome::Unparsable
}
