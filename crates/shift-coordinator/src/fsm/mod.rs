//! Call FSM (F).
//!
//! A tagged variant `Phase` dispatched by a single `step(session, event, ctx)` function —
//! no per-phase mutable globals; state threads through the return value instead.
//! `Phase::AuthByPhone` and `Phase::ProviderSelect` exist for completeness of the phase
//! table but are never assigned by this implementation: phone-based auth and the provider
//! menu both collapse into `Greeting`'s single step, because the data model in
//! [`crate::domain`] ties every `Employee` to exactly one `Provider` (see DESIGN.md's Open
//! Question on multi-provider employees) — there is never a menu to show.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use shift_speech_interpreter::confidence::{disposition, Disposition};
use shift_speech_interpreter::action::Action as SpeechAction;
use shift_speech_interpreter::reason::has_effective_content;
use shift_speech_interpreter::{action, alnum, datetime, digits, reason, yesno, Outcome};
use shift_speech_interpreter::yesno::YesNo;

use crate::arbiter::{ArbiterHandle, ArbiterOutcome, Intent};
use crate::constants::{
    GLOBAL_CALL_TIMEOUT_SECS, MAX_OCCURRENCE_CHOICES, MAX_PHASE_ATTEMPTS,
    MIN_REASON_EFFECTIVE_CHARS, REPOSITORY_MAX_RETRIES, REPOSITORY_RETRY_BACKOFF_MS,
};
use crate::domain::{CallScratch, CallSession};
use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Greeting,
    AuthByPhone,
    AuthByPin,
    ProviderSelect,
    JobCode,
    ConfirmJobCode,
    JobOptions,
    OccurrenceSelect,
    CollectDateTime,
    ConfirmDateTime,
    CollectReason,
    ConfirmRelease,
    Transferred,
    Completed,
    Abandoned,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Transferred | Phase::Completed | Phase::Abandoned)
    }
}

/// An inbound happening the driving loop feeds into [`step`]. DTMF and speech gathers are
/// assumed already complete by the time they reach the FSM (the server layer accumulates
/// single-key DTMF webhooks into one gathered string per [`crate::constants`]'s expected
/// digit counts — see `crate::server`).
#[derive(Debug, Clone)]
pub enum CallEvent {
    Started,
    Speech { transcript: String, confidence: f32 },
    Dtmf { digits: String },
    Ended,
}

impl CallEvent {
    fn text(&self) -> Option<&str> {
        match self {
            CallEvent::Speech { transcript, .. } => Some(transcript),
            CallEvent::Dtmf { digits } => Some(digits),
            CallEvent::Started | CallEvent::Ended => None,
        }
    }
}

/// What the driving loop must do next against the telephony adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlayThenGatherSpeech { text: String, timeout_secs: u64 },
    PlayThenGatherDtmf { text: String, num_digits: usize, timeout_secs: u64 },
    TransferTo { number: String },
    PlayThenHangUp { text: String },
    HangUp,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub action: Action,
    /// Set once the call reaches a terminal phase — the driving loop uses this to
    /// finalise the call's [`crate::domain::CallLog`], which is written once at call end
    /// and never mutated thereafter.
    pub call_log_outcome: Option<String>,
}

impl StepOutcome {
    fn action(action: Action) -> Self {
        StepOutcome { action, call_log_outcome: None }
    }

    fn terminal(action: Action, outcome: impl Into<String>) -> Self {
        StepOutcome { action, call_log_outcome: Some(outcome.into()) }
    }
}

/// Dependencies a call-scoped step needs: the repository and a handle to the arbiter.
#[derive(Clone)]
pub struct FsmContext {
    pub repository: Arc<dyn Repository>,
    pub arbiter: ArbiterHandle,
}

pub fn new_session(call_id: String, provider_id: String, caller_phone: String) -> CallSession {
    let now = Utc::now();
    CallSession {
        id: call_id,
        provider_id,
        caller_phone,
        authenticated_employee_id: None,
        selected_occurrence_id: None,
        phase: Phase::Greeting,
        attempt_count: 0,
        transcript: Vec::new(),
        created_at: now,
        last_event_at: now,
        scratch: CallScratch::default(),
    }
}

/// The single dispatch point for every phase transition.
pub async fn step(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    session.last_event_at = Utc::now();

    if matches!(event, CallEvent::Ended) {
        return handle_ended(session);
    }

    if !session.phase.is_terminal()
        && (Utc::now() - session.created_at).num_seconds() > GLOBAL_CALL_TIMEOUT_SECS
    {
        return transfer(ctx, session, "GlobalTimeout").await;
    }

    match session.phase {
        Phase::Greeting | Phase::AuthByPhone => handle_greeting(session, event, ctx).await,
        Phase::AuthByPin => handle_auth_by_pin(session, event, ctx).await,
        Phase::ProviderSelect => handle_provider_select(session).await,
        Phase::JobCode => handle_job_code(session, event, ctx).await,
        Phase::ConfirmJobCode => handle_confirm_job_code(session, event, ctx).await,
        Phase::JobOptions => handle_job_options(session, event, ctx).await,
        Phase::OccurrenceSelect => handle_occurrence_select(session, event, ctx).await,
        Phase::CollectDateTime => handle_collect_datetime(session, event, ctx).await,
        Phase::ConfirmDateTime => handle_confirm_datetime(session, event, ctx).await,
        Phase::CollectReason => handle_collect_reason(session, event, ctx).await,
        Phase::ConfirmRelease => handle_confirm_release(session, event, ctx).await,
        Phase::Transferred | Phase::Completed | Phase::Abandoned => StepOutcome::action(Action::None),
    }
}

fn handle_ended(session: &mut CallSession) -> StepOutcome {
    match session.phase {
        Phase::Completed => StepOutcome::terminal(Action::None, "Completed"),
        Phase::Transferred => StepOutcome::terminal(Action::None, "Transferred"),
        Phase::Abandoned => StepOutcome::terminal(Action::None, "Abandoned"),
        _ => {
            session.phase = Phase::Abandoned;
            StepOutcome::terminal(Action::HangUp, "Abandoned")
        }
    }
}

/// Thin retry wrapper around a repository call — deliberately never wraps a status CAS.
/// Retries only `BackendUnavailable`, up to [`REPOSITORY_MAX_RETRIES`] times, with a
/// jittered backoff so a fleet of concurrently-retrying calls doesn't thunder back in
/// lockstep.
async fn retry<T, F, Fut>(mut f: F) -> RepositoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RepositoryResult<T>>,
{
    let mut attempts = 0u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(RepositoryError::BackendUnavailable(msg)) if attempts < REPOSITORY_MAX_RETRIES => {
                attempts += 1;
                warn!("repository call failed ({msg}), retry {attempts}/{REPOSITORY_MAX_RETRIES}");
                let jitter_ms = rand::thread_rng().gen_range(0..=REPOSITORY_RETRY_BACKOFF_MS);
                tokio::time::sleep(Duration::from_millis(REPOSITORY_RETRY_BACKOFF_MS + jitter_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A transient-infrastructure failure degrades the call to Transferred; a lost
/// arbiter race, a missing transfer number, and repeated retry exhaustion all funnel
/// through here too.
async fn transfer(ctx: &FsmContext, session: &mut CallSession, _reason: &str) -> StepOutcome {
    session.phase = Phase::Transferred;
    let fallback = || {
        StepOutcome::terminal(
            Action::PlayThenHangUp {
                text: "We're unable to transfer you right now. Someone will call you back shortly.".to_string(),
            },
            "TransferFailedNoNumber",
        )
    };
    match retry(|| ctx.repository.get_provider(&session.provider_id)).await {
        Ok(Some(provider)) => match provider.transfer_number {
            Some(number) => StepOutcome::terminal(Action::TransferTo { number }, "Transferred"),
            None => fallback(),
        },
        _ => fallback(),
    }
}

async fn provider_local_now(ctx: &FsmContext, provider_id: &str) -> RepositoryResult<chrono::NaiveDateTime> {
    let provider = retry(|| ctx.repository.get_provider(provider_id))
        .await?
        .ok_or(RepositoryError::NotFound)?;
    let tz: chrono_tz::Tz = provider.timezone.parse().unwrap_or(chrono_tz::Australia::Sydney);
    Ok(Utc::now().with_timezone(&tz).naive_local())
}

fn prompt_job_code(session: &CallSession) -> StepOutcome {
    let text = if session.scratch.simplified_prompts {
        "Please say or spell your shift's job code, letter by letter.".to_string()
    } else {
        "Please say your shift's job code.".to_string()
    };
    StepOutcome::action(Action::PlayThenGatherSpeech { text, timeout_secs: 8 })
}

async fn handle_greeting(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    if !matches!(event, CallEvent::Started) {
        return StepOutcome::action(Action::None);
    }

    let provider = match retry(|| ctx.repository.get_provider(&session.provider_id)).await {
        Ok(Some(p)) => p,
        _ => return transfer(ctx, session, "TransientInfra").await,
    };
    session.transcript.push(format!("ivr_greeting: {}", provider.ivr_greeting_text));

    match retry(|| ctx.repository.find_employee_by_phone(&session.provider_id, &session.caller_phone)).await {
        Ok(Some(employee)) => {
            session.authenticated_employee_id = Some(employee.id);
            session.phase = Phase::JobCode;
            session.attempt_count = 0;
            prompt_job_code(session)
        }
        Ok(None) => {
            session.phase = Phase::AuthByPin;
            session.attempt_count = 0;
            StepOutcome::action(Action::PlayThenGatherDtmf {
                text: "Please enter your 4 digit pin.".to_string(),
                num_digits: 4,
                timeout_secs: 10,
            })
        }
        Err(_) => transfer(ctx, session, "TransientInfra").await,
    }
}

fn confirm_pin_prompt(pin: &str) -> StepOutcome {
    let spelled = pin.chars().map(|c| c.to_string()).collect::<Vec<_>>().join(" ");
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: format!("I heard {spelled}. Is that right?"),
        timeout_secs: 6,
    })
}

async fn authenticate_pin(session: &mut CallSession, ctx: &FsmContext, pin: &str) -> StepOutcome {
    match retry(|| ctx.repository.find_employee_by_pin(&session.provider_id, pin)).await {
        Ok(Some(employee)) => {
            session.authenticated_employee_id = Some(employee.id);
            session.phase = Phase::JobCode;
            session.attempt_count = 0;
            session.scratch.simplified_prompts = false;
            prompt_job_code(session)
        }
        Ok(None) => retry_auth_pin(session, ctx).await,
        Err(RepositoryError::Ambiguous(msg)) => {
            warn!("pin ambiguous for provider {}: {}", session.provider_id, msg);
            transfer(ctx, session, "AmbiguousPin").await
        }
        Err(_) => transfer(ctx, session, "TransientInfra").await,
    }
}

async fn handle_auth_by_pin(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };

    if let Some(pin) = session.scratch.pending_pin.take() {
        return match yesno::parse(text) {
            Outcome::Parsed(p) if p.token == YesNo::Yes => authenticate_pin(session, ctx, &pin).await,
            Outcome::Parsed(p) if p.token == YesNo::No => retry_auth_pin(session, ctx).await,
            _ => {
                session.scratch.pending_pin = Some(pin.clone());
                confirm_pin_prompt(&pin)
            }
        };
    }

    match digits::parse(text, 4) {
        Outcome::Parsed(p) => match disposition(p.confidence) {
            Disposition::AutoAccept => authenticate_pin(session, ctx, &p.token).await,
            Disposition::ConfirmOnce => {
                session.scratch.pending_pin = Some(p.token.clone());
                confirm_pin_prompt(&p.token)
            }
            Disposition::RePrompt => retry_auth_pin(session, ctx).await,
        },
        Outcome::Unparsable => retry_auth_pin(session, ctx).await,
    }
}

async fn retry_auth_pin(session: &mut CallSession, ctx: &FsmContext) -> StepOutcome {
    session.attempt_count += 1;
    if session.attempt_count >= MAX_PHASE_ATTEMPTS {
        return transfer(ctx, session, "MaxAttempts").await;
    }
    session.scratch.simplified_prompts = true;
    StepOutcome::action(Action::PlayThenGatherDtmf {
        text: "Sorry, I didn't get that. Please enter your 4 digit pin, one digit at a time.".to_string(),
        num_digits: 4,
        timeout_secs: 10,
    })
}

/// Unreachable with the one-employee-one-provider data model; kept so `Phase::ProviderSelect`
/// is a valid state for API completeness (see module docs and DESIGN.md).
async fn handle_provider_select(session: &mut CallSession) -> StepOutcome {
    session.phase = Phase::JobCode;
    prompt_job_code(session)
}

fn confirm_job_code_prompt(code: &str) -> StepOutcome {
    let spelled = code.chars().map(|c| c.to_string()).collect::<Vec<_>>().join(" ");
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: format!("I heard {spelled}. Is that right?"),
        timeout_secs: 6,
    })
}

async fn handle_job_code(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match alnum::parse(text) {
        Outcome::Parsed(p) if disposition(p.confidence) != Disposition::RePrompt => {
            match retry(|| ctx.repository.find_shift_template(&session.provider_id, &p.token)).await {
                Ok(Some(template)) => {
                    session.scratch.job_code = Some(p.token.clone());
                    session.scratch.template_id = Some(template.id);
                    session.phase = Phase::ConfirmJobCode;
                    session.attempt_count = 0;
                    session.scratch.confirm_retry_used = false;
                    confirm_job_code_prompt(&p.token)
                }
                Ok(None) => retry_job_code(session, ctx).await,
                Err(_) => transfer(ctx, session, "TransientInfra").await,
            }
        }
        _ => retry_job_code(session, ctx).await,
    }
}

async fn retry_job_code(session: &mut CallSession, ctx: &FsmContext) -> StepOutcome {
    session.attempt_count += 1;
    if session.attempt_count >= MAX_PHASE_ATTEMPTS {
        return transfer(ctx, session, "MaxAttempts").await;
    }
    session.scratch.simplified_prompts = true;
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: "Sorry, I didn't catch that job code. Please spell it letter by letter.".to_string(),
        timeout_secs: 8,
    })
}

fn job_options_prompt() -> StepOutcome {
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: "Would you like to reschedule this shift, release it, or speak with a person?".to_string(),
        timeout_secs: 8,
    })
}

async fn handle_confirm_job_code(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match yesno::parse(text) {
        Outcome::Parsed(p) if p.token == YesNo::Yes => {
            session.phase = Phase::JobOptions;
            session.attempt_count = 0;
            job_options_prompt()
        }
        Outcome::Parsed(p) if p.token == YesNo::No => {
            session.phase = Phase::JobCode;
            session.scratch.job_code = None;
            session.scratch.template_id = None;
            prompt_job_code(session)
        }
        _ => {
            if !session.scratch.confirm_retry_used {
                session.scratch.confirm_retry_used = true;
                let code = session.scratch.job_code.clone().unwrap_or_default();
                confirm_job_code_prompt(&code)
            } else {
                retry_job_code(session, ctx).await
            }
        }
    }
}

async fn handle_job_options(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match action::parse(text) {
        Outcome::Parsed(p) => match p.token {
            SpeechAction::Transfer => transfer(ctx, session, "CallerRequestedTransfer").await,
            SpeechAction::Reschedule => {
                session.scratch.chosen_action = Some("Reschedule".to_string());
                load_occurrence_candidates(session, ctx).await
            }
            SpeechAction::Release => {
                session.scratch.chosen_action = Some("Release".to_string());
                load_occurrence_candidates(session, ctx).await
            }
        },
        Outcome::Unparsable => retry_job_options(session, ctx).await,
    }
}

async fn load_occurrence_candidates(session: &mut CallSession, ctx: &FsmContext) -> StepOutcome {
    let Some(employee_id) = session.authenticated_employee_id.clone() else {
        return transfer(ctx, session, "Unauthenticated").await;
    };
    let now = Utc::now().naive_utc();
    let occurrences = match retry(|| {
        ctx.repository
            .list_upcoming_occurrences_for_employee(&session.provider_id, &employee_id, now)
    })
    .await
    {
        Ok(list) => list,
        Err(_) => return transfer(ctx, session, "TransientInfra").await,
    };

    let matching: Vec<_> = occurrences
        .into_iter()
        .filter(|o| {
            session
                .scratch
                .template_id
                .as_deref()
                .is_none_or(|t| o.template_id.as_deref() == Some(t))
        })
        .take(MAX_OCCURRENCE_CHOICES)
        .collect();

    if matching.is_empty() {
        return transfer(ctx, session, "NoUpcomingOccurrences").await;
    }

    session.scratch.occurrence_candidates = matching.iter().map(|o| o.id.clone()).collect();
    session.phase = Phase::OccurrenceSelect;
    session.attempt_count = 0;

    let menu = matching
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}: {} at {}", i + 1, o.scheduled_date, o.start_time.format("%H:%M")))
        .collect::<Vec<_>>()
        .join(", ");
    StepOutcome::action(Action::PlayThenGatherDtmf {
        text: format!("Here are your upcoming shifts: {menu}. Please press the number of the one you mean."),
        num_digits: 1,
        timeout_secs: 8,
    })
}

async fn retry_job_options(session: &mut CallSession, ctx: &FsmContext) -> StepOutcome {
    session.attempt_count += 1;
    if session.attempt_count >= MAX_PHASE_ATTEMPTS {
        return transfer(ctx, session, "MaxAttempts").await;
    }
    session.scratch.simplified_prompts = true;
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: "Sorry, please say reschedule, release, or person.".to_string(),
        timeout_secs: 6,
    })
}

async fn handle_occurrence_select(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    let parsed_index = match digits::parse(text, 1) {
        Outcome::Parsed(p) => p.token.parse::<usize>().ok(),
        Outcome::Unparsable => None,
    };

    match parsed_index {
        Some(idx) if idx >= 1 && idx <= session.scratch.occurrence_candidates.len() => {
            session.selected_occurrence_id = Some(session.scratch.occurrence_candidates[idx - 1].clone());
            session.attempt_count = 0;
            if session.scratch.chosen_action.as_deref() == Some("Reschedule") {
                session.phase = Phase::CollectDateTime;
                collect_datetime_prompt(session)
            } else {
                session.phase = Phase::CollectReason;
                StepOutcome::action(Action::PlayThenGatherSpeech {
                    text: "What's the reason you need to release this shift?".to_string(),
                    timeout_secs: 8,
                })
            }
        }
        _ => retry_occurrence_select(session, ctx).await,
    }
}

async fn retry_occurrence_select(session: &mut CallSession, ctx: &FsmContext) -> StepOutcome {
    session.attempt_count += 1;
    if session.attempt_count >= MAX_PHASE_ATTEMPTS {
        return transfer(ctx, session, "MaxAttempts").await;
    }
    StepOutcome::action(Action::PlayThenGatherDtmf {
        text: "Sorry, please press 1, 2, or 3 for the shift you mean.".to_string(),
        num_digits: 1,
        timeout_secs: 8,
    })
}

fn collect_datetime_prompt(session: &CallSession) -> StepOutcome {
    let text = if session.scratch.simplified_prompts {
        "What date and time would you like to move the shift to? For example, say next Tuesday at 10 AM.".to_string()
    } else {
        "When would you like to reschedule to?".to_string()
    };
    StepOutcome::action(Action::PlayThenGatherSpeech { text, timeout_secs: 8 })
}

async fn handle_collect_datetime(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    let now_local = match provider_local_now(ctx, &session.provider_id).await {
        Ok(now) => now,
        Err(_) => return transfer(ctx, session, "TransientInfra").await,
    };

    match datetime::parse(text, now_local) {
        Outcome::Parsed(p) => {
            let date = p.token.date.or(session.scratch.pending_date);
            let time = p.token.time.or(session.scratch.pending_time);
            session.scratch.pending_date = date;
            session.scratch.pending_time = time;

            match (date, time) {
                (Some(d), Some(t)) => {
                    let combined = chrono::NaiveDateTime::new(d, t);
                    if datetime::is_valid_for_scheduling(combined, now_local) {
                        session.phase = Phase::ConfirmDateTime;
                        session.attempt_count = 0;
                        session.scratch.confirm_retry_used = false;
                        StepOutcome::action(Action::PlayThenGatherSpeech {
                            text: format!("I heard {d} at {}. Is that right?", t.format("%H:%M")),
                            timeout_secs: 6,
                        })
                    } else {
                        session.scratch.pending_date = None;
                        session.scratch.pending_time = None;
                        retry_collect_datetime(
                            session,
                            ctx,
                            "That time is in the past or outside business hours. Please give me another date and time.",
                        )
                        .await
                    }
                }
                (Some(_), None) => StepOutcome::action(Action::PlayThenGatherSpeech {
                    text: "What time on that day?".to_string(),
                    timeout_secs: 6,
                }),
                (None, Some(_)) => StepOutcome::action(Action::PlayThenGatherSpeech {
                    text: "What day would you like?".to_string(),
                    timeout_secs: 6,
                }),
                (None, None) => {
                    retry_collect_datetime(session, ctx, "Sorry, I didn't catch a date or time.").await
                }
            }
        }
        Outcome::Unparsable => {
            retry_collect_datetime(session, ctx, "Sorry, I didn't catch that. When would you like to reschedule to?")
                .await
        }
    }
}

async fn retry_collect_datetime(session: &mut CallSession, ctx: &FsmContext, message: &str) -> StepOutcome {
    session.attempt_count += 1;
    if session.attempt_count >= MAX_PHASE_ATTEMPTS {
        return transfer(ctx, session, "MaxAttempts").await;
    }
    session.scratch.simplified_prompts = true;
    StepOutcome::action(Action::PlayThenGatherSpeech { text: message.to_string(), timeout_secs: 8 })
}

async fn handle_confirm_datetime(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match yesno::parse(text) {
        Outcome::Parsed(p) if p.token == YesNo::Yes => {
            let (Some(date), Some(time), Some(occurrence_id)) = (
                session.scratch.pending_date,
                session.scratch.pending_time,
                session.selected_occurrence_id.clone(),
            ) else {
                return transfer(ctx, session, "MissingState").await;
            };
            match ctx
                .arbiter
                .submit(Intent::Reschedule { occurrence_id, new_date: date, new_time: time })
                .await
            {
                Ok(ArbiterOutcome::Accepted) => {
                    session.phase = Phase::Completed;
                    StepOutcome::terminal(
                        Action::PlayThenHangUp {
                            text: format!("You're all set, rescheduled to {date} at {}.", time.format("%H:%M")),
                        },
                        "Rescheduled",
                    )
                }
                Ok(ArbiterOutcome::Rejected(_)) | Err(_) => {
                    if !session.scratch.confirm_retry_used {
                        session.scratch.confirm_retry_used = true;
                        session.phase = Phase::CollectDateTime;
                        session.scratch.pending_date = None;
                        session.scratch.pending_time = None;
                        StepOutcome::action(Action::PlayThenGatherSpeech {
                            text: "Sorry, that shift just changed. What date and time would you like instead?"
                                .to_string(),
                            timeout_secs: 8,
                        })
                    } else {
                        transfer(ctx, session, "RaceLost").await
                    }
                }
            }
        }
        Outcome::Parsed(p) if p.token == YesNo::No => {
            session.phase = Phase::CollectDateTime;
            session.scratch.pending_date = None;
            session.scratch.pending_time = None;
            session.attempt_count = 0;
            collect_datetime_prompt(session)
        }
        _ => StepOutcome::action(Action::PlayThenGatherSpeech {
            text: "Sorry, was that a yes or a no?".to_string(),
            timeout_secs: 6,
        }),
    }
}

async fn handle_collect_reason(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match reason::parse(text) {
        Outcome::Parsed(p) if has_effective_content(&p.token.raw_text, MIN_REASON_EFFECTIVE_CHARS) => {
            session.scratch.release_reason = Some(p.token.raw_text.clone());
            session.phase = Phase::ConfirmRelease;
            session.attempt_count = 0;
            session.scratch.confirm_retry_used = false;
            confirm_release_prompt(session)
        }
        _ => {
            session.attempt_count += 1;
            if session.attempt_count >= MAX_PHASE_ATTEMPTS {
                return transfer(ctx, session, "MaxAttempts").await;
            }
            StepOutcome::action(Action::PlayThenGatherSpeech {
                text: "Could you tell me a bit more about why you need to release this shift?".to_string(),
                timeout_secs: 8,
            })
        }
    }
}

fn confirm_release_prompt(session: &CallSession) -> StepOutcome {
    let reason_text = session.scratch.release_reason.clone().unwrap_or_default();
    StepOutcome::action(Action::PlayThenGatherSpeech {
        text: format!("I heard: {reason_text}. Should I release this shift back to the pool?"),
        timeout_secs: 6,
    })
}

async fn handle_confirm_release(session: &mut CallSession, event: CallEvent, ctx: &FsmContext) -> StepOutcome {
    let Some(text) = event.text() else {
        return StepOutcome::action(Action::None);
    };
    match yesno::parse(text) {
        Outcome::Parsed(p) if p.token == YesNo::Yes => {
            let (Some(occurrence_id), Some(reason_text), Some(employee_id)) = (
                session.selected_occurrence_id.clone(),
                session.scratch.release_reason.clone(),
                session.authenticated_employee_id.clone(),
            ) else {
                return transfer(ctx, session, "MissingState").await;
            };
            match ctx
                .arbiter
                .submit(Intent::Release {
                    occurrence_id,
                    reason: reason_text,
                    original_employee_id: employee_id,
                })
                .await
            {
                Ok(ArbiterOutcome::Accepted) => {
                    session.phase = Phase::Completed;
                    StepOutcome::terminal(
                        Action::PlayThenHangUp {
                            text: "Thanks, we've let your team know this shift needs covering.".to_string(),
                        },
                        "Released",
                    )
                }
                _ => transfer(ctx, session, "RaceLost").await,
            }
        }
        Outcome::Parsed(p) if p.token == YesNo::No => {
            session.phase = Phase::CollectReason;
            session.scratch.release_reason = None;
            session.attempt_count = 0;
            StepOutcome::action(Action::PlayThenGatherSpeech {
                text: "No problem. What's the reason, in your own words?".to_string(),
                timeout_secs: 8,
            })
        }
        _ => StepOutcome::action(Action::PlayThenGatherSpeech {
            text: "Sorry, was that a yes or a no?".to_string(),
            timeout_secs: 6,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Employee, OnCallWindow, OutboundCallingConfig, Patient, Provider, ShiftOccurrence,
        ShiftTemplate, WaveDelayConfig,
    };
    use crate::queue::SqlxJobQueue;
    use crate::repository::SqlxRepository;
    use crate::sms::NullSmsAdapter;
    use chrono::{NaiveDate, NaiveTime};

    async fn context() -> (FsmContext, SqlxRepository) {
        let repo = SqlxRepository::new_in_memory().await.unwrap();
        let queue = SqlxJobQueue::new(repo.pool().clone());
        let arbiter = crate::arbiter::spawn(
            Arc::new(repo.clone()),
            Arc::new(queue),
            Arc::new(NullSmsAdapter::default()),
        );
        let ctx = FsmContext { repository: Arc::new(repo.clone()), arbiter };
        (ctx, repo)
    }

    async fn seed_basic(repo: &SqlxRepository) {
        let provider = Provider {
            id: "prov-1".into(),
            name: "Test".into(),
            phone_number: "+61291230000".into(),
            timezone: "Australia/Sydney".into(),
            transfer_number: Some("+61491570000".into()),
            ivr_greeting_text: "Welcome".into(),
            on_call_window: OnCallWindow {
                start_local: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                end_local: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                timezone: "Australia/Sydney".into(),
            },
            outbound_calling: OutboundCallingConfig {
                enabled: true,
                wait_minutes: 15,
                max_rounds: 3,
                message_template: "Shift available".into(),
            },
            wave_delays: WaveDelayConfig::default(),
        };
        repo.create_provider(&provider).await.unwrap();

        repo.create_employee(&Employee {
            id: "emp-1".into(),
            provider_id: provider.id.clone(),
            display_name: "Alice".into(),
            phone: "+61491570006".into(),
            pin: "1234".into(),
            active: true,
            outbound_call_opt_in: true,
        })
        .await
        .unwrap();

        repo.create_patient(&Patient {
            id: "pat-1".into(),
            provider_id: provider.id.clone(),
            display_name: "Jane D.".into(),
            phone: "+61491570099".into(),
            dob: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
            staff_pool: vec!["emp-1".into()],
        })
        .await
        .unwrap();

        repo.create_shift_template(&ShiftTemplate {
            id: "tmpl-1".into(),
            provider_id: provider.id.clone(),
            patient_id: "pat-1".into(),
            default_employee_id: Some("emp-1".into()),
            job_code: "AB12".into(),
            start_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_of_day: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        })
        .await
        .unwrap();

        repo.create_shift_occurrence(&ShiftOccurrence {
            id: "occ-1".into(),
            template_id: Some("tmpl-1".into()),
            patient_id: "pat-1".into(),
            provider_id: provider.id.clone(),
            assigned_employee_id: Some("emp-1".into()),
            scheduled_date: Utc::now().date_naive() + chrono::Duration::days(1),
            start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            status: crate::domain::OccurrenceStatus::Assigned,
            wave1_sent_at: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn greeting_recognises_caller_by_phone_and_asks_for_job_code() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-1".into(), "prov-1".into(), "+61491570006".into());

        let outcome = step(&mut session, CallEvent::Started, &ctx).await;

        assert_eq!(session.phase, Phase::JobCode);
        assert_eq!(session.authenticated_employee_id.as_deref(), Some("emp-1"));
        assert!(matches!(outcome.action, Action::PlayThenGatherSpeech { .. }));
    }

    #[tokio::test]
    async fn unknown_caller_is_sent_to_pin_auth() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-2".into(), "prov-1".into(), "+61400000000".into());

        let outcome = step(&mut session, CallEvent::Started, &ctx).await;

        assert_eq!(session.phase, Phase::AuthByPin);
        assert!(matches!(outcome.action, Action::PlayThenGatherDtmf { num_digits: 4, .. }));
    }

    #[tokio::test]
    async fn pin_auth_exhausts_after_three_failed_attempts() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-3".into(), "prov-1".into(), "+61400000000".into());
        step(&mut session, CallEvent::Started, &ctx).await;
        assert_eq!(session.phase, Phase::AuthByPin);

        for _ in 0..2 {
            let outcome = step(&mut session, CallEvent::Dtmf { digits: "0000".into() }, &ctx).await;
            assert_eq!(session.phase, Phase::AuthByPin);
            assert!(matches!(outcome.action, Action::PlayThenGatherDtmf { .. }));
        }
        let outcome = step(&mut session, CallEvent::Dtmf { digits: "0000".into() }, &ctx).await;
        assert_eq!(session.phase, Phase::Transferred);
        assert!(matches!(outcome.action, Action::TransferTo { .. }));
    }

    #[tokio::test]
    async fn full_reschedule_happy_path_ends_completed() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-4".into(), "prov-1".into(), "+61491570006".into());

        step(&mut session, CallEvent::Started, &ctx).await;
        assert_eq!(session.phase, Phase::JobCode);

        step(&mut session, CallEvent::Speech { transcript: "AB12".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::ConfirmJobCode);

        step(&mut session, CallEvent::Speech { transcript: "yes".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::JobOptions);

        step(&mut session, CallEvent::Speech { transcript: "reschedule".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::OccurrenceSelect);

        step(&mut session, CallEvent::Dtmf { digits: "1".into() }, &ctx).await;
        assert_eq!(session.phase, Phase::CollectDateTime);

        step(
            &mut session,
            CallEvent::Speech { transcript: "next tuesday at 10 am".into(), confidence: 1.0 },
            &ctx,
        )
        .await;
        assert_eq!(session.phase, Phase::ConfirmDateTime);

        let outcome =
            step(&mut session, CallEvent::Speech { transcript: "yes".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::Completed);
        assert_eq!(outcome.call_log_outcome.as_deref(), Some("Rescheduled"));

        let updated = repo.get_occurrence("occ-1").await.unwrap().unwrap();
        assert_eq!(updated.status, crate::domain::OccurrenceStatus::Rescheduled);
    }

    #[tokio::test]
    async fn full_release_happy_path_ends_completed_and_opens_occurrence() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-5".into(), "prov-1".into(), "+61491570006".into());

        step(&mut session, CallEvent::Started, &ctx).await;
        step(&mut session, CallEvent::Speech { transcript: "AB12".into(), confidence: 1.0 }, &ctx).await;
        step(&mut session, CallEvent::Speech { transcript: "yes".into(), confidence: 1.0 }, &ctx).await;
        step(&mut session, CallEvent::Speech { transcript: "leave open".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::OccurrenceSelect);

        step(&mut session, CallEvent::Dtmf { digits: "1".into() }, &ctx).await;
        assert_eq!(session.phase, Phase::CollectReason);

        step(
            &mut session,
            CallEvent::Speech { transcript: "I'm sick today".into(), confidence: 1.0 },
            &ctx,
        )
        .await;
        assert_eq!(session.phase, Phase::ConfirmRelease);

        let outcome =
            step(&mut session, CallEvent::Speech { transcript: "yes".into(), confidence: 1.0 }, &ctx).await;
        assert_eq!(session.phase, Phase::Completed);
        assert_eq!(outcome.call_log_outcome.as_deref(), Some("Released"));

        let updated = repo.get_occurrence("occ-1").await.unwrap().unwrap();
        assert_eq!(updated.status, crate::domain::OccurrenceStatus::Open);
    }

    #[tokio::test]
    async fn transfer_falls_back_when_no_transfer_number_configured() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut provider = repo.get_provider("prov-1").await.unwrap().unwrap();
        provider.transfer_number = None;
        repo.update_provider_config(&provider).await.unwrap();

        let mut session = new_session("call-6".into(), "prov-1".into(), "+61400000000".into());
        step(&mut session, CallEvent::Started, &ctx).await;
        for _ in 0..2 {
            step(&mut session, CallEvent::Dtmf { digits: "0000".into() }, &ctx).await;
        }
        let outcome = step(&mut session, CallEvent::Dtmf { digits: "0000".into() }, &ctx).await;
        assert_eq!(session.phase, Phase::Transferred);
        assert!(matches!(outcome.action, Action::PlayThenHangUp { .. }));
        assert_eq!(outcome.call_log_outcome.as_deref(), Some("TransferFailedNoNumber"));
    }

    #[tokio::test]
    async fn caller_hangup_before_terminal_is_abandoned() {
        let (ctx, repo) = context().await;
        seed_basic(&repo).await;
        let mut session = new_session("call-7".into(), "prov-1".into(), "+61491570006".into());
        step(&mut session, CallEvent::Started, &ctx).await;

        let outcome = step(&mut session, CallEvent::Ended, &ctx).await;
        assert_eq!(session.phase, Phase::Abandoned);
        assert_eq!(outcome.call_log_outcome.as_deref(), Some("Abandoned"));
    }
}
