//! After-hours voice/SMS shift-coverage coordinator.
//!
//! This crate wires together the ten leaf components named in spec §2:
//!
//! - [`repository`] — R, the tenancy-scoped record store.
//! - [`session_store`] — S, per-call scratch state.
//! - [`queue`] — Q, the durable delayed job queue.
//! - [`telephony`] and [`sms`] — T and M, the external adapter traits.
//! - [`fsm`] — F, the per-call state machine.
//! - [`wave`] — W, the SMS fan-out scheduler.
//! - [`outbound`] — O, the round-robin outbound dialer.
//! - [`arbiter`] — A, the single point of truth for occurrence status.
//!
//! [`server`] exposes all of the above over the Axum webhook surface named in spec §6;
//! [`config`] and [`logging`] are the ambient process-level concerns carried regardless of
//! spec §1's product Non-goals (SPEC_FULL.md §B).

pub mod arbiter;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod fsm;
pub mod logging;
pub mod outbound;
pub mod phone;
pub mod queue;
pub mod repository;
pub mod server;
pub mod session_store;
pub mod sms;
pub mod telephony;
pub mod wave;

pub use error::{ArbiterError, FsmError, PhoneError, QueueError, RepositoryError, SpeechError};
