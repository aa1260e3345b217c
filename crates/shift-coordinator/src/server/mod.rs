//! Telephony/SMS webhook surface and admin read API.
//!
//! Plain `axum` wiring: a `Router` over `State<AppState>`, served with `axum::serve`. The
//! wire shape for telephony instructions is otherwise unconstrained, so this module picks
//! one JSON contract and keeps it consistent rather than leaving it ad hoc per handler.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arbiter::{ArbiterHandle, ArbiterOutcome, Intent};
use crate::domain::{CallDirection, CallLog, OccurrenceStatus};
use crate::fsm::{self, Action, CallEvent, FsmContext};
use crate::repository::Repository;
use crate::sms::{SmsAdapter, SmsReplyEvent};
use crate::telephony::{CallEndEvent, CallStartEvent, DtmfEvent, SpeechResultEvent};

/// Everything a handler needs, bundled the way `rest_api_demo::server` bundles its
/// `AuthService` into one `AppState` passed to `with_state`.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub sessions: crate::session_store::SessionStore,
    pub arbiter: ArbiterHandle,
    pub sms: Arc<dyn SmsAdapter>,
    /// Per-call DTMF accumulation: webhooks deliver one digit at a time, but [`fsm::step`]
    /// expects the whole gathered string (see `fsm`'s module doc). Keyed by call id, value
    /// is `(expected_digit_count, digits_so_far)`.
    dtmf_pending: Arc<DashMap<String, (usize, String)>>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn Repository>,
        sessions: crate::session_store::SessionStore,
        arbiter: ArbiterHandle,
        sms: Arc<dyn SmsAdapter>,
    ) -> Self {
        AppState {
            repository,
            sessions,
            arbiter,
            sms,
            dtmf_pending: Arc::new(DashMap::new()),
        }
    }

    fn fsm_context(&self) -> FsmContext {
        FsmContext {
            repository: self.repository.clone(),
            arbiter: self.arbiter.clone(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/telephony/call-start", post(call_start))
        .route("/webhooks/telephony/speech-result", post(speech_result))
        .route("/webhooks/telephony/dtmf", post(dtmf))
        .route("/webhooks/telephony/call-end", post(call_end))
        .route("/webhooks/sms/reply", post(sms_reply))
        .route(
            "/admin/providers/:provider_id/occurrences",
            get(list_occurrences),
        )
        .route(
            "/admin/providers/:provider_id/call-logs",
            get(list_call_logs),
        )
        .with_state(state)
}

/// The wire shape a driving telephony loop acts on. Tagged so the loop can `match` on
/// `action` without a client-side enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WebhookResponse {
    GatherSpeech { text: String, timeout_secs: u64 },
    GatherDtmf { text: String, num_digits: usize, timeout_secs: u64 },
    Transfer { number: String },
    PlayThenHangUp { text: String },
    HangUp,
    None,
}

impl From<Action> for WebhookResponse {
    fn from(action: Action) -> Self {
        match action {
            Action::PlayThenGatherSpeech { text, timeout_secs } => {
                WebhookResponse::GatherSpeech { text, timeout_secs }
            }
            Action::PlayThenGatherDtmf { text, num_digits, timeout_secs } => {
                WebhookResponse::GatherDtmf { text, num_digits, timeout_secs }
            }
            Action::TransferTo { number } => WebhookResponse::Transfer { number },
            Action::PlayThenHangUp { text } => WebhookResponse::PlayThenHangUp { text },
            Action::HangUp => WebhookResponse::HangUp,
            Action::None => WebhookResponse::None,
        }
    }
}

fn call_log_id(call_id: &str) -> String {
    format!("log:{call_id}")
}

/// Runs one FSM step, then either finalises and drops the call's log and session (the
/// outcome reached a terminal phase) or persists the session for the next webhook.
async fn drive(state: &AppState, session: &mut crate::domain::CallSession, event: CallEvent) -> WebhookResponse {
    let ctx = state.fsm_context();
    let outcome = fsm::step(session, event, &ctx).await;

    if let Some(call_outcome) = &outcome.call_log_outcome {
        if let Err(e) = state
            .repository
            .finalize_call_log(&call_log_id(&session.id), Utc::now(), call_outcome)
            .await
        {
            warn!("failed to finalise call log for {}: {}", session.id, e);
        }
        state.sessions.delete(&session.id);
        state.dtmf_pending.remove(&session.id);
    } else {
        state.sessions.put(session.clone());
    }

    outcome.action.into()
}

async fn call_start(
    State(state): State<AppState>,
    Json(event): Json<CallStartEvent>,
) -> Json<WebhookResponse> {
    let caller_phone = crate::phone::normalise(&event.from).unwrap_or(event.from.clone());
    let dialed_number = crate::phone::normalise(&event.to).unwrap_or(event.to.clone());

    let provider = match state.repository.find_provider_by_phone(&dialed_number).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            warn!("call-start for unknown number {}, hanging up", dialed_number);
            return Json(WebhookResponse::PlayThenHangUp {
                text: "This number is not currently in service. Goodbye.".to_string(),
            });
        }
        Err(e) => {
            warn!("repository error resolving provider for {}: {}", dialed_number, e);
            return Json(WebhookResponse::PlayThenHangUp {
                text: "We're experiencing a technical issue. Please try again shortly.".to_string(),
            });
        }
    };

    let log = CallLog {
        id: call_log_id(&event.call_id),
        call_id: event.call_id.clone(),
        direction: CallDirection::Inbound,
        provider_id: provider.id.clone(),
        employee_id: None,
        patient_id: None,
        started_at: Utc::now(),
        ended_at: None,
        purpose: "InboundShiftCall".to_string(),
        outcome: None,
        dtmf_response: None,
        attempt_round: None,
        recording_ref: None,
    };
    if let Err(e) = state.repository.append_call_log(&log).await {
        warn!("failed to create call log for {}: {}", event.call_id, e);
    }

    let mut session = fsm::new_session(event.call_id.clone(), provider.id, caller_phone);
    let response = drive(&state, &mut session, CallEvent::Started).await;
    if let WebhookResponse::GatherDtmf { num_digits, .. } = &response {
        state.dtmf_pending.insert(event.call_id.clone(), (*num_digits, String::new()));
    }
    Json(response)
}

fn session_missing_response() -> Json<WebhookResponse> {
    Json(WebhookResponse::PlayThenHangUp {
        text: "Sorry, we lost track of this call. Please call back.".to_string(),
    })
}

async fn speech_result(
    State(state): State<AppState>,
    Json(event): Json<SpeechResultEvent>,
) -> Json<WebhookResponse> {
    let Some(mut session) = state.sessions.get(&event.call_id) else {
        return session_missing_response();
    };
    let response = drive(
        &state,
        &mut session,
        CallEvent::Speech { transcript: event.transcript, confidence: event.confidence },
    )
    .await;
    if let WebhookResponse::GatherDtmf { num_digits, .. } = &response {
        state.dtmf_pending.insert(event.call_id.clone(), (*num_digits, String::new()));
    } else {
        state.dtmf_pending.remove(&event.call_id);
    }
    Json(response)
}

/// Telephony providers typically deliver DTMF one key at a time. Accumulate into the
/// digit count the last gather requested, then feed the FSM once that count is reached
/// (module doc on [`fsm`] and [`crate::telephony`]).
async fn dtmf(State(state): State<AppState>, Json(event): Json<DtmfEvent>) -> Json<WebhookResponse> {
    if state.sessions.get(&event.call_id).is_none() {
        return session_missing_response();
    }

    let expected = state
        .dtmf_pending
        .get(&event.call_id)
        .map(|entry| entry.0)
        .unwrap_or(1);

    let mut ready = None;
    {
        let mut entry = state
            .dtmf_pending
            .entry(event.call_id.clone())
            .or_insert((expected, String::new()));
        entry.1.push(event.digit);
        if entry.1.len() >= entry.0.max(1) {
            ready = Some(entry.1.clone());
        }
    }

    let Some(digits) = ready else {
        return Json(WebhookResponse::None);
    };
    state.dtmf_pending.remove(&event.call_id);

    let Some(mut session) = state.sessions.get(&event.call_id) else {
        return session_missing_response();
    };
    let response = drive(&state, &mut session, CallEvent::Dtmf { digits }).await;
    if let WebhookResponse::GatherDtmf { num_digits, .. } = &response {
        state.dtmf_pending.insert(event.call_id.clone(), (*num_digits, String::new()));
    }
    Json(response)
}

async fn call_end(State(state): State<AppState>, Json(event): Json<CallEndEvent>) -> Json<WebhookResponse> {
    let Some(mut session) = state.sessions.get(&event.call_id) else {
        // Already finalised by a prior terminal step; nothing to do.
        return Json(WebhookResponse::None);
    };
    let response = drive(&state, &mut session, CallEvent::Ended).await;
    Json(response)
}

/// Finds the occurrence this employee's Wave SMS most plausibly answers: still open to a
/// reply (Open or UnfilledAfterSMS), with Wave 1 sent within the last
/// [`crate::constants::SMS_REPLY_WINDOW_HOURS`], with this employee in the patient's staff
/// pool, earliest-scheduled first. There is no separate "wave sent to X" ledger, so this is
/// the closest provider-scoped signal available — recorded as an Open Question decision in
/// DESIGN.md.
async fn find_candidate_occurrence_for_employee(
    repository: &dyn Repository,
    provider_id: &str,
    employee_id: &str,
) -> anyhow::Result<Option<String>> {
    let mut candidates = Vec::new();
    for status in [OccurrenceStatus::Open, OccurrenceStatus::UnfilledAfterSMS] {
        candidates.extend(repository.list_occurrences_by_status(provider_id, status).await?);
    }
    candidates.sort_by_key(|o| (o.scheduled_date, o.start_time));

    let now = chrono::Utc::now();
    for occurrence in candidates {
        let within_window = occurrence.wave1_sent_at.is_some_and(|sent_at| {
            now - sent_at <= chrono::Duration::hours(crate::constants::SMS_REPLY_WINDOW_HOURS)
        });
        if !within_window {
            continue;
        }
        if let Some(patient) = repository.get_patient(&occurrence.patient_id).await? {
            if patient.staff_pool.iter().any(|id| id == employee_id) {
                return Ok(Some(occurrence.id));
            }
        }
    }
    Ok(None)
}

async fn sms_reply(State(state): State<AppState>, Json(event): Json<SmsReplyEvent>) -> StatusCode {
    if !event.is_accept_reply() {
        return StatusCode::OK;
    }

    let to = crate::phone::normalise(&event.to).unwrap_or(event.to.clone());
    let from = crate::phone::normalise(&event.from).unwrap_or(event.from.clone());

    let provider = match state.repository.find_provider_by_phone(&to).await {
        Ok(Some(p)) => p,
        _ => {
            warn!("sms reply to unknown provider number {}", to);
            return StatusCode::OK;
        }
    };
    let employee = match state.repository.find_employee_by_phone(&provider.id, &from).await {
        Ok(Some(e)) => e,
        _ => {
            warn!("sms reply from unknown employee number {}", from);
            return StatusCode::OK;
        }
    };

    let occurrence_id = match find_candidate_occurrence_for_employee(&*state.repository, &provider.id, &employee.id).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            info!("sms accept from {} matched no open occurrence", employee.id);
            return StatusCode::OK;
        }
        Err(e) => {
            warn!("repository error matching sms accept to an occurrence: {}", e);
            return StatusCode::OK;
        }
    };

    match state
        .arbiter
        .submit(Intent::Accept { occurrence_id: occurrence_id.clone(), employee_id: employee.id.clone() })
        .await
    {
        Ok(ArbiterOutcome::Accepted) => {
            info!("employee {} accepted occurrence {} via SMS", employee.id, occurrence_id);
        }
        Ok(ArbiterOutcome::Rejected(reason)) => {
            info!("sms accept for {} rejected: {:?}", occurrence_id, reason);
            let _ = state
                .sms
                .send(&employee.phone, "Sorry, that shift has already been filled.")
                .await;
        }
        Err(e) => warn!("arbiter submit failed for sms accept: {}", e),
    }

    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct OccurrenceQuery {
    status: String,
}

async fn list_occurrences(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(query): Query<OccurrenceQuery>,
) -> Result<Json<Vec<crate::domain::ShiftOccurrence>>, StatusCode> {
    let status = OccurrenceStatus::from_str(&query.status).ok_or(StatusCode::BAD_REQUEST)?;
    state
        .repository
        .list_occurrences_by_status(&provider_id, status)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn list_call_logs(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Json<Vec<CallLog>>, StatusCode> {
    state
        .repository
        .list_call_logs_for_provider(&provider_id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
