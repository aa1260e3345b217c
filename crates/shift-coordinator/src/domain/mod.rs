//! Core entity model.
//!
//! These types are the shapes the [`crate::repository::Repository`] trait reads and
//! writes. They carry no behaviour of their own beyond simple derived helpers —
//! transitions on [`OccurrenceStatus`] live in [`crate::arbiter`], not here.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub type ProviderId = String;
pub type EmployeeId = String;
pub type PatientId = String;
pub type TemplateId = String;
pub type OccurrenceId = String;
pub type CallId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCallWindow {
    pub start_local: NaiveTime,
    pub end_local: NaiveTime,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundCallingConfig {
    pub enabled: bool,
    pub wait_minutes: i32,
    pub max_rounds: i32,
    pub message_template: String,
}

impl OutboundCallingConfig {
    /// Catches the ConfigInvalid case: outbound enabled with no usable template.
    pub fn is_valid(&self) -> bool {
        if !self.enabled {
            return true;
        }
        (1..=120).contains(&self.wait_minutes)
            && (1..=5).contains(&self.max_rounds)
            && !self.message_template.trim().is_empty()
            && self.message_template.len() <= 500
    }
}

/// Delay, in minutes, between Wave 1 and each follow-up wave. Provider-configured, with
/// defaults of 15/30 minutes — modelled here as its own provider-scoped config struct
/// (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveDelayConfig {
    pub wave2_minutes: i32,
    pub wave3_minutes: i32,
}

impl Default for WaveDelayConfig {
    fn default() -> Self {
        WaveDelayConfig {
            wave2_minutes: crate::constants::DEFAULT_WAVE2_DELAY_MINUTES as i32,
            wave3_minutes: crate::constants::DEFAULT_WAVE3_DELAY_MINUTES as i32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    /// The number callers dial to reach this provider's IVR; normalised E.164, looked up by [`crate::server`] on every
    /// inbound call-start webhook to resolve the tenancy boundary before a [`CallSession`]
    /// exists.
    pub phone_number: String,
    pub timezone: String,
    pub transfer_number: Option<String>,
    pub ivr_greeting_text: String,
    pub on_call_window: OnCallWindow,
    pub outbound_calling: OutboundCallingConfig,
    pub wave_delays: WaveDelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub provider_id: ProviderId,
    pub display_name: String,
    pub phone: String,
    pub pin: String,
    pub active: bool,
    pub outbound_call_opt_in: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub provider_id: ProviderId,
    pub display_name: String,
    pub phone: String,
    pub dob: NaiveDate,
    /// Ordered set of employee ids (the Related Staff Pool). Every member must belong to
    /// the same provider as the patient — callers are responsible for that invariant when
    /// writing it.
    pub staff_pool: Vec<EmployeeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: TemplateId,
    pub provider_id: ProviderId,
    pub patient_id: PatientId,
    pub default_employee_id: Option<EmployeeId>,
    pub job_code: String,
    pub start_of_day: NaiveTime,
    pub end_of_day: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccurrenceStatus {
    Scheduled,
    Assigned,
    Rescheduled,
    Open,
    UnfilledAfterSMS,
    UnfilledAfterCalls,
    Completed,
    Cancelled,
}

impl OccurrenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceStatus::Scheduled => "SCHEDULED",
            OccurrenceStatus::Assigned => "ASSIGNED",
            OccurrenceStatus::Rescheduled => "RESCHEDULED",
            OccurrenceStatus::Open => "OPEN",
            OccurrenceStatus::UnfilledAfterSMS => "UNFILLED_AFTER_SMS",
            OccurrenceStatus::UnfilledAfterCalls => "UNFILLED_AFTER_CALLS",
            OccurrenceStatus::Completed => "COMPLETED",
            OccurrenceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "SCHEDULED" => OccurrenceStatus::Scheduled,
            "ASSIGNED" => OccurrenceStatus::Assigned,
            "RESCHEDULED" => OccurrenceStatus::Rescheduled,
            "OPEN" => OccurrenceStatus::Open,
            "UNFILLED_AFTER_SMS" => OccurrenceStatus::UnfilledAfterSMS,
            "UNFILLED_AFTER_CALLS" => OccurrenceStatus::UnfilledAfterCalls,
            "COMPLETED" => OccurrenceStatus::Completed,
            "CANCELLED" => OccurrenceStatus::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftOccurrence {
    pub id: OccurrenceId,
    pub template_id: Option<TemplateId>,
    pub patient_id: PatientId,
    pub provider_id: ProviderId,
    pub assigned_employee_id: Option<EmployeeId>,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: OccurrenceStatus,
    /// When Wave 1's SMS fan-out went out, if it ever has. Anchors the 24h SMS-reply
    /// acceptance window in spec §4.7; `None` until [`crate::wave::on_released`] sends it.
    pub wave1_sent_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Per-call phases (see [`crate::fsm::Phase`] for the dispatch enum); this is just the
/// durable transcript/counter bundle the session store holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: CallId,
    pub provider_id: ProviderId,
    pub caller_phone: String,
    pub authenticated_employee_id: Option<EmployeeId>,
    pub selected_occurrence_id: Option<OccurrenceId>,
    pub phase: crate::fsm::Phase,
    pub attempt_count: u32,
    pub transcript: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_event_at: chrono::DateTime<chrono::Utc>,
    /// Per-call scratch state the FSM accumulates across phases.
    pub scratch: CallScratch,
}

/// Working state specific to the in-progress reschedule/release flow. Reset whenever a
/// new call begins; not meaningful once the call reaches a terminal phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallScratch {
    /// The job code as read back to the caller in `ConfirmJobCode`.
    pub job_code: Option<String>,
    pub template_id: Option<TemplateId>,
    /// Set once `JobOptions` resolves to Reschedule or Release.
    pub chosen_action: Option<String>,
    /// Up to 3 candidate occurrences offered in `OccurrenceSelect`.
    pub occurrence_candidates: Vec<OccurrenceId>,
    /// Partial new date/time accumulated across `CollectDateTime` retries.
    pub pending_date: Option<NaiveDate>,
    pub pending_time: Option<NaiveTime>,
    /// Free-text reason accumulated in `CollectReason`.
    pub release_reason: Option<String>,
    /// Set after the FSM has already spent a confirmation step in the current phase, so
    /// it doesn't ask twice (`ConfirmJobCode`'s "ambiguous -> re-confirm once").
    pub confirm_retry_used: bool,
    /// PIN awaiting a one-shot yes/no readback; `AuthByPin` has no dedicated confirm
    /// phase, so this doubles as the "are we currently confirming" flag.
    pub pending_pin: Option<String>,
    /// Set after any retry in any phase; the next prompt switches to the simplified,
    /// digit-by-digit variant.
    pub simplified_prompts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveNumber {
    One = 1,
    Two = 2,
    Three = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveJob {
    pub occurrence_id: OccurrenceId,
    pub wave_number: WaveNumber,
    pub staff_pool_snapshot: Vec<EmployeeId>,
    pub provider_id: ProviderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundCallJob {
    pub occurrence_id: OccurrenceId,
    pub round_number: i32,
    pub pool_index: usize,
    pub pool_snapshot: Vec<EmployeeId>,
    pub provider_id: ProviderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: String,
    pub call_id: CallId,
    pub direction: CallDirection,
    pub provider_id: ProviderId,
    pub employee_id: Option<EmployeeId>,
    pub patient_id: Option<PatientId>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub purpose: String,
    pub outcome: Option<String>,
    pub dtmf_response: Option<String>,
    pub attempt_round: Option<i32>,
    pub recording_ref: Option<String>,
}
