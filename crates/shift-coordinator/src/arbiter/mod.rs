//! Assignment Arbiter (A).
//!
//! Single point of truth for occurrence-status transitions. Modelled as an actor with an
//! internal `mpsc` mailbox processing intents FIFO, so concurrent Accept intents from voice
//! DTMF, SMS reply, and outbound-call DTMF serialise through one task even though
//! `compare_and_set_status` is already race-safe on its own — this keeps the
//! at-most-one-accept guarantee in one inspectable place instead of spread across callers.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::domain::OccurrenceStatus;
use crate::error::ArbiterError;
use crate::queue::JobQueue;
use crate::repository::Repository;
use crate::sms::SmsAdapter;

#[derive(Debug, Clone)]
pub enum Intent {
    Reschedule {
        occurrence_id: String,
        new_date: NaiveDate,
        new_time: NaiveTime,
    },
    Release {
        occurrence_id: String,
        reason: String,
        original_employee_id: String,
    },
    Accept {
        occurrence_id: String,
        employee_id: String,
    },
    WavesExhausted {
        occurrence_id: String,
    },
    CallsExhausted {
        occurrence_id: String,
    },
}

impl Intent {
    pub fn occurrence_id(&self) -> &str {
        match self {
            Intent::Reschedule { occurrence_id, .. }
            | Intent::Release { occurrence_id, .. }
            | Intent::Accept { occurrence_id, .. }
            | Intent::WavesExhausted { occurrence_id }
            | Intent::CallsExhausted { occurrence_id } => occurrence_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The CAS lost the race: some other intent changed the status first.
    RaceLost,
    /// The intent's precondition didn't hold (wrong current status, invalid payload).
    InvalidIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterOutcome {
    Accepted,
    Rejected(RejectReason),
}

struct Request {
    intent: Intent,
    reply: oneshot::Sender<Result<ArbiterOutcome, ArbiterError>>,
}

/// Handle callers use to submit intents. Cloning is cheap (it's just a channel sender).
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: mpsc::Sender<Request>,
}

impl ArbiterHandle {
    pub async fn submit(&self, intent: Intent) -> Result<ArbiterOutcome, ArbiterError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request {
                intent,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ArbiterError::InvalidIntent("arbiter mailbox closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ArbiterError::InvalidIntent("arbiter dropped the reply".to_string()))?
    }
}

/// Spawns the mailbox task and returns a handle to it. The task runs until every clone of
/// the handle is dropped.
pub fn spawn(
    repository: Arc<dyn Repository>,
    queue: Arc<dyn JobQueue>,
    sms: Arc<dyn SmsAdapter>,
) -> ArbiterHandle {
    let (tx, mut rx) = mpsc::channel::<Request>(256);

    tokio::spawn(async move {
        while let Some(Request { intent, reply }) = rx.recv().await {
            let result = process_intent(&*repository, &*queue, &*sms, intent).await;
            let _ = reply.send(result);
        }
    });

    ArbiterHandle { tx }
}

async fn process_intent(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    sms: &dyn SmsAdapter,
    intent: Intent,
) -> Result<ArbiterOutcome, ArbiterError> {
    let occurrence_id = intent.occurrence_id().to_string();
    let occurrence = repository
        .get_occurrence(&occurrence_id)
        .await?
        .ok_or_else(|| ArbiterError::InvalidIntent(format!("unknown occurrence {occurrence_id}")))?;

    let (allowed_current, next_status) = match &intent {
        Intent::Reschedule { new_date, new_time, .. } => {
            let now = repository
                .get_provider(&occurrence.provider_id)
                .await?
                .map(|p| {
                    let tz: chrono_tz::Tz = p.timezone.parse().unwrap_or(chrono_tz::Australia::Sydney);
                    chrono::Utc::now().with_timezone(&tz).naive_local()
                })
                .unwrap_or_else(|| chrono::Utc::now().naive_utc());
            let candidate = NaiveDateTime::new(*new_date, *new_time);
            if !shift_speech_interpreter::datetime::is_valid_for_scheduling(candidate, now) {
                return Ok(ArbiterOutcome::Rejected(RejectReason::InvalidIntent));
            }
            (
                vec![OccurrenceStatus::Scheduled, OccurrenceStatus::Assigned],
                OccurrenceStatus::Rescheduled,
            )
        }
        Intent::Release { reason, .. } => {
            if reason.trim().is_empty() {
                return Ok(ArbiterOutcome::Rejected(RejectReason::InvalidIntent));
            }
            (
                vec![OccurrenceStatus::Scheduled, OccurrenceStatus::Assigned],
                OccurrenceStatus::Open,
            )
        }
        Intent::Accept { employee_id, .. } => {
            let patient = repository
                .get_patient(&occurrence.patient_id)
                .await?
                .ok_or_else(|| ArbiterError::InvalidIntent("patient missing".to_string()))?;
            if !patient.staff_pool.iter().any(|id| id == employee_id) {
                return Ok(ArbiterOutcome::Rejected(RejectReason::InvalidIntent));
            }
            (
                vec![OccurrenceStatus::Open, OccurrenceStatus::UnfilledAfterSMS],
                OccurrenceStatus::Assigned,
            )
        }
        Intent::WavesExhausted { .. } => {
            (vec![OccurrenceStatus::Open], OccurrenceStatus::UnfilledAfterSMS)
        }
        Intent::CallsExhausted { .. } => (
            vec![OccurrenceStatus::UnfilledAfterSMS],
            OccurrenceStatus::UnfilledAfterCalls,
        ),
    };

    if !allowed_current.contains(&occurrence.status) {
        return Ok(ArbiterOutcome::Rejected(RejectReason::InvalidIntent));
    }

    let cas_ok = repository
        .compare_and_set_status(&occurrence_id, occurrence.status, next_status)
        .await?;

    if !cas_ok {
        warn!("race lost on occurrence {}", occurrence_id);
        return Ok(ArbiterOutcome::Rejected(RejectReason::RaceLost));
    }

    info!(
        "occurrence {} {:?} -> {:?} via {:?}",
        occurrence_id, occurrence.status, next_status, intent
    );

    match intent {
        Intent::Reschedule {
            new_date, new_time, ..
        } => {
            repository
                .update_occurrence_schedule(&occurrence_id, new_date, new_time)
                .await?;
        }
        Intent::Release { .. } => {
            crate::wave::on_released(repository, queue, sms, &occurrence_id)
                .await
                .map_err(|e| ArbiterError::InvalidIntent(e.to_string()))?;
        }
        Intent::Accept { employee_id, .. } => {
            queue.cancel(&format!("shift:{occurrence_id}:")).await.ok();
            repository
                .set_assigned_employee(&occurrence_id, &employee_id)
                .await?;
            if let Some(employee) = repository.get_employee(&employee_id).await? {
                let _ = sms
                    .send(&employee.phone, "You're confirmed for this shift. Thank you!")
                    .await;
            }
        }
        Intent::WavesExhausted { .. } => {
            crate::outbound::on_waves_exhausted(repository, queue, &occurrence_id)
                .await
                .map_err(|e| ArbiterError::InvalidIntent(e.to_string()))?;
        }
        Intent::CallsExhausted { .. } => {
            // Terminal; nothing further to do beyond the CAS already applied.
        }
    }

    Ok(ArbiterOutcome::Accepted)
}
