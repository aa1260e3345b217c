//! Named tunables.

/// Speech confidence at or above which F auto-accepts a parsed token without confirmation.
pub use shift_speech_interpreter::confidence::AUTO_ACCEPT;
/// Speech confidence below which F re-prompts instead of asking for confirmation.
pub use shift_speech_interpreter::confidence::CONFIRM_FLOOR;

/// Session TTL.
pub const SESSION_TTL_SECS: i64 = 60 * 60;

/// Per-phase retry budget before F gives up and transfers.
pub const MAX_PHASE_ATTEMPTS: u32 = 3;

/// Global call timer: forces Transferred or Abandoned after this long.
pub const GLOBAL_CALL_TIMEOUT_SECS: i64 = 10 * 60;

/// Default Wave 2 delay after Wave 1, when not overridden by provider config.
pub const DEFAULT_WAVE2_DELAY_MINUTES: i64 = 15;

/// Default Wave 3 delay after Wave 1, when not overridden by provider config.
pub const DEFAULT_WAVE3_DELAY_MINUTES: i64 = 30;

/// Default queue worker pool size.
pub const DEFAULT_QUEUE_WORKERS: usize = 5;

/// Dead-letter threshold for queue jobs.
pub const MAX_JOB_ATTEMPTS: i32 = 3;

/// Outbound ring timeout.
pub const OUTBOUND_RING_TIMEOUT_SECS: u64 = 30;

/// DTMF gather timeout on outbound calls.
pub const OUTBOUND_DTMF_TIMEOUT_SECS: u64 = 10;

/// R retry policy: 5s budget, 1 retry.
pub const REPOSITORY_CALL_TIMEOUT_SECS: u64 = 5;
pub const REPOSITORY_MAX_RETRIES: u32 = 1;
/// Base backoff before a retried repository call; jittered by up to this many
/// milliseconds again on top (spec §7's "retry with jittered backoff").
pub const REPOSITORY_RETRY_BACKOFF_MS: u64 = 150;

/// SMS reply acceptance window after Wave 1.
pub const SMS_REPLY_WINDOW_HOURS: i64 = 24;

/// Minimum "effective content" length for a release reason before F accepts it (spec
/// §4.6 CollectReason).
pub const MIN_REASON_EFFECTIVE_CHARS: usize = 5;

/// Business-hours policy used by the datetime validator.
pub const BUSINESS_HOURS_START: u32 = 7;
pub const BUSINESS_HOURS_END: u32 = 18;

/// Occurrence lookup horizon for `ListUpcomingOccurrencesForEmployee`.
pub const UPCOMING_OCCURRENCE_HORIZON_DAYS: i64 = 14;

/// Maximum occurrences read back to the caller in OccurrenceSelect.
pub const MAX_OCCURRENCE_CHOICES: usize = 3;
