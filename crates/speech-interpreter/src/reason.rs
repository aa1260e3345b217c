//! `free-reason` grammar — pass-through text, best-effort categorised.
//!
//! Categorisation never gates acceptance; it's metadata for the admin-visible call log.
//! The effective-content-length check ("did the caller actually say anything") is the
//! FSM's job, not this grammar's — this module only classifies whatever text it's given.

use crate::{Outcome, Parsed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCategory {
    Illness,
    FamilyEmergency,
    WorkConflict,
    Transportation,
    Personal,
    SchedulingConflict,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reason {
    pub raw_text: String,
    pub category: ReasonCategory,
}

const ILLNESS: &[&str] = &["sick", "ill", "flu", "fever", "unwell", "vomit", "covid"];
const FAMILY: &[&str] = &["family", "emergency", "kid", "child", "son", "daughter", "parent"];
const WORK: &[&str] = &["another job", "work conflict", "second job", "double booked"];
const TRANSPORT: &[&str] = &["car", "bus", "train", "flat tyre", "flat tire", "ride", "transport"];
const PERSONAL: &[&str] = &["personal", "appointment", "doctor", "dentist"];
const SCHEDULING: &[&str] = &["double shift", "overlap", "conflict", "scheduling"];

/// Categorise free-form text into one of the canonical reason buckets. Never returns
/// [`Outcome::Unparsable`] — any non-empty text is at worst `Other`.
pub fn parse(input: &str) -> Outcome<Reason> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Outcome::Unparsable;
    }
    let normalized = trimmed.to_ascii_lowercase();

    let category = if ILLNESS.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::Illness
    } else if FAMILY.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::FamilyEmergency
    } else if WORK.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::WorkConflict
    } else if TRANSPORT.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::Transportation
    } else if SCHEDULING.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::SchedulingConflict
    } else if PERSONAL.iter().any(|w| normalized.contains(w)) {
        ReasonCategory::Personal
    } else {
        ReasonCategory::Other
    };

    Outcome::Parsed(Parsed::confident(Reason {
        raw_text: trimmed.to_string(),
        category,
    }))
}

/// The FSM's "effective content" gate: does this reason have enough substance to act on,
/// once whitespace-only padding is stripped out.
pub fn has_effective_content(raw_text: &str, min_chars: usize) -> bool {
    raw_text.split_whitespace().collect::<String>().chars().count() >= min_chars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illness_categorised() {
        let Outcome::Parsed(p) = parse("I'm sick today") else {
            panic!("expected parsed")
        };
        assert_eq!(p.token.category, ReasonCategory::Illness);
    }

    #[test]
    fn unrecognised_text_is_other() {
        let Outcome::Parsed(p) = parse("xyz") else {
            panic!("expected parsed")
        };
        assert_eq!(p.token.category, ReasonCategory::Other);
    }

    #[test]
    fn empty_text_is_unparsable() {
        assert_eq!(parse("   "), Outcome::Unparsable);
    }

    #[test]
    fn effective_content_gate() {
        assert!(!has_effective_content("no", 5));
        assert!(has_effective_content("I'm sick", 5));
    }
}
