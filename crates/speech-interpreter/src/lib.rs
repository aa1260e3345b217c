//! # Speech Interpreter
//!
//! A stateless grammar-driven parser that turns free-form spoken text (already
//! transcribed by an upstream STT engine) into typed tokens the call FSM can act on.
//!
//! Each grammar lives in its own module and exposes a single `parse` function of the
//! shape `fn parse(input: &str) -> Outcome<T>`. None of these functions hold state or
//! perform I/O — callers pass in the raw transcript and get back either a [`Parsed<T>`]
//! (with a confidence score) or [`Outcome::Unparsable`].
//!
//! The confidence thresholds a caller uses to decide between auto-accepting, asking for
//! one confirmation, or re-prompting are kept as named constants in [`confidence`] so they
//! can be tuned without touching call logic.

pub mod action;
pub mod alnum;
pub mod confidence;
pub mod datetime;
pub mod digits;
pub mod reason;
pub mod words;
pub mod yesno;

/// A successfully parsed token, together with how sure the interpreter is.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// The best-guess token.
    pub token: T,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Other candidates the parser considered, most-likely first.
    pub alternatives: Vec<T>,
    /// Set when the grammar recognises the input as a partial answer (e.g. a bare time
    /// with no date) that needs a follow-up prompt rather than a retry.
    pub needs_more: bool,
}

impl<T> Parsed<T> {
    pub fn confident(token: T) -> Self {
        Parsed {
            token,
            confidence: 1.0,
            alternatives: Vec::new(),
            needs_more: false,
        }
    }

    pub fn with_confidence(token: T, confidence: f32) -> Self {
        Parsed {
            token,
            confidence,
            alternatives: Vec::new(),
            needs_more: false,
        }
    }
}

/// The result of running a grammar over a transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Parsed(Parsed<T>),
    Unparsable,
}

impl<T> Outcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Outcome::Parsed(_))
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Outcome::Parsed(p) => Some(p.confidence),
            Outcome::Unparsable => None,
        }
    }
}
