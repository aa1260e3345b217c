//! Outbound Caller (O).
//!
//! Sequential, round-robin, one call at a time per occurrence: each [`OutboundCallJob`]
//! handles exactly one pool member, then enqueues the next job (same round, next index, or
//! next round) with `delay = 0`. There is never more than one in-flight call per
//! occurrence because the chain only advances from inside a job handler.

use std::time::Duration;

use tracing::{info, warn};

use crate::arbiter::{ArbiterHandle, ArbiterOutcome, Intent};
use crate::domain::{CallDirection, CallLog, Employee, OccurrenceStatus, OutboundCallJob};
use crate::queue::{JobPayload, JobQueue};
use crate::repository::Repository;
use crate::sms::SmsAdapter;
use crate::telephony::{OutboundCallRequest, TelephonyAdapter};

fn job_key(occurrence_id: &str, round: i32, pool_index: usize) -> String {
    format!("shift:{occurrence_id}:call:{round}:{pool_index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DtmfOutcome {
    Accept,
    Decline,
    NoInput,
}

fn classify_dtmf(digits: &str) -> DtmfOutcome {
    match digits.trim() {
        "1" => DtmfOutcome::Accept,
        "2" => DtmfOutcome::Decline,
        _ => DtmfOutcome::NoInput,
    }
}

/// Wave 3's terminator calls this to seed round 1. The job itself is enqueued by W; this
/// function exists so the seam between W and O is named explicitly rather than W reaching
/// directly into O's queue-key format.
pub fn first_job(occurrence_id: &str, provider_id: &str, pool_snapshot: Vec<String>) -> OutboundCallJob {
    OutboundCallJob {
        occurrence_id: occurrence_id.to_string(),
        round_number: 1,
        pool_index: 0,
        pool_snapshot,
        provider_id: provider_id.to_string(),
    }
}

/// Called by the Arbiter right after a `WavesExhausted` intent is accepted. The Arbiter
/// delegates the actual enqueue decision to W's Wave-3 handler, which already holds the
/// provider config and snapshot — this function is kept for symmetry with
/// `wave::on_released` but the real work happens inline in `wave::handle_wave_job`.
pub async fn on_waves_exhausted(
    _repository: &dyn Repository,
    _queue: &dyn JobQueue,
    occurrence_id: &str,
) -> anyhow::Result<()> {
    info!("occurrence {} waves exhausted (outbound scheduling handled by wave::handle_wave_job)", occurrence_id);
    Ok(())
}

/// Per-job handler.
pub async fn handle_call_job(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    telephony: &dyn TelephonyAdapter,
    sms: &dyn SmsAdapter,
    arbiter: &ArbiterHandle,
    job: &OutboundCallJob,
) -> anyhow::Result<()> {
    // Step 1: re-read; drop if someone already accepted.
    let occurrence = repository
        .get_occurrence(&job.occurrence_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("occurrence {} missing", job.occurrence_id))?;
    if occurrence.status != OccurrenceStatus::UnfilledAfterSMS {
        info!(
            "outbound job for {} dropped: status is {:?}",
            job.occurrence_id, occurrence.status
        );
        return Ok(());
    }

    let provider = repository
        .get_provider(&job.provider_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("provider {} missing", job.provider_id))?;

    // Step 2: pick the pool member at pool_index, skipping ineligible ones by advancing
    // forward within the same round until we find one or exhaust the round.
    let Some((employee, index)) = next_eligible(repository, &job.pool_snapshot, job.pool_index).await? else {
        return advance_round(repository, queue, &provider.id, job).await;
    };

    // Step 3/4: synthesise + place the call, play once, gather one DTMF digit with one retry.
    let message = crate::sms::render_template(
        &provider.outbound_calling.message_template,
        &[("employeeName", employee.display_name.as_str())],
    );
    let call_id = telephony
        .place_call(OutboundCallRequest {
            to: employee.phone.clone(),
            from: String::new(),
            initial_play_url: message.clone(),
            status_callback: String::new(),
        })
        .await?;

    telephony.play_audio(&call_id, &message).await.ok();
    let mut digits = telephony
        .gather_dtmf(&call_id, 1, Duration::from_secs(crate::constants::OUTBOUND_DTMF_TIMEOUT_SECS))
        .await
        .unwrap_or_default();
    if classify_dtmf(&digits) == DtmfOutcome::NoInput {
        // one retry prompt
        digits = telephony
            .gather_dtmf(&call_id, 1, Duration::from_secs(crate::constants::OUTBOUND_DTMF_TIMEOUT_SECS))
            .await
            .unwrap_or_default();
    }
    let outcome = classify_dtmf(&digits);

    let log = CallLog {
        id: uuid::Uuid::new_v4().to_string(),
        call_id: call_id.clone(),
        direction: CallDirection::Outbound,
        provider_id: provider.id.clone(),
        employee_id: Some(employee.id.clone()),
        patient_id: Some(occurrence.patient_id.clone()),
        started_at: chrono::Utc::now(),
        ended_at: Some(chrono::Utc::now()),
        purpose: "OutboundShiftOffer".to_string(),
        outcome: Some(match outcome {
            DtmfOutcome::Accept => "Accepted".to_string(),
            DtmfOutcome::Decline => "Declined".to_string(),
            DtmfOutcome::NoInput => "NoAnswer".to_string(),
        }),
        dtmf_response: Some(digits.clone()),
        attempt_round: Some(job.round_number),
        recording_ref: None,
    };
    repository.append_call_log(&log).await?;

    // Step 5: outcomes.
    match outcome {
        DtmfOutcome::Accept => {
            let result = arbiter
                .submit(Intent::Accept {
                    occurrence_id: job.occurrence_id.clone(),
                    employee_id: employee.id.clone(),
                })
                .await?;
            match result {
                ArbiterOutcome::Accepted => {
                    telephony.hang_up(&call_id).await.ok();
                    info!("employee {} accepted occurrence {} by DTMF", employee.id, job.occurrence_id);
                }
                ArbiterOutcome::Rejected(_) => {
                    telephony
                        .play_text(&call_id, "Sorry, the shift has already been filled.")
                        .await
                        .ok();
                    telephony.hang_up(&call_id).await.ok();
                }
            }
            Ok(())
        }
        DtmfOutcome::Decline | DtmfOutcome::NoInput => {
            telephony.hang_up(&call_id).await.ok();
            advance_within_round_or_round(repository, queue, sms, &provider.id, job, index).await
        }
    }
}

/// Finds the next pool member at or after `start_index` that is eligible (opted in, phone
/// normalises) in this snapshot. Returns `None` if the round is exhausted.
async fn next_eligible(
    repository: &dyn Repository,
    pool: &[String],
    start_index: usize,
) -> anyhow::Result<Option<(Employee, usize)>> {
    for (offset, employee_id) in pool.iter().enumerate().skip(start_index) {
        let Some(employee) = repository.get_employee(employee_id).await? else {
            continue;
        };
        if !employee.active || !employee.outbound_call_opt_in {
            continue;
        }
        if crate::phone::normalise(&employee.phone).is_err() {
            continue;
        }
        return Ok(Some((employee, offset)));
    }
    Ok(None)
}

/// After a decline/no-input at `index`, enqueue the next eligible member in the same round,
/// or roll to the next round, or finalise UnfilledAfterCalls if rounds are exhausted.
async fn advance_within_round_or_round(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    _sms: &dyn SmsAdapter,
    provider_id: &str,
    job: &OutboundCallJob,
    index: usize,
) -> anyhow::Result<()> {
    let next_index = index + 1;
    if next_index < job.pool_snapshot.len() {
        let next_job = OutboundCallJob {
            occurrence_id: job.occurrence_id.clone(),
            round_number: job.round_number,
            pool_index: next_index,
            pool_snapshot: job.pool_snapshot.clone(),
            provider_id: job.provider_id.clone(),
        };
        queue
            .enqueue(
                &job_key(&job.occurrence_id, job.round_number, next_index),
                JobPayload::Outbound(next_job),
                Duration::from_secs(0),
            )
            .await?;
        return Ok(());
    }
    advance_round(repository, queue, provider_id, job).await
}

/// The current round's pool is exhausted: start the next round, or finalise.
async fn advance_round(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    provider_id: &str,
    job: &OutboundCallJob,
) -> anyhow::Result<()> {
    let provider = repository
        .get_provider(provider_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("provider {provider_id} missing"))?;

    if job.round_number < provider.outbound_calling.max_rounds {
        let next_round = job.round_number + 1;
        let next_job = OutboundCallJob {
            occurrence_id: job.occurrence_id.clone(),
            round_number: next_round,
            pool_index: 0,
            pool_snapshot: job.pool_snapshot.clone(),
            provider_id: job.provider_id.clone(),
        };
        queue
            .enqueue(
                &job_key(&job.occurrence_id, next_round, 0),
                JobPayload::Outbound(next_job),
                Duration::from_secs(0),
            )
            .await?;
        info!("occurrence {} advancing to outbound round {}", job.occurrence_id, next_round);
        return Ok(());
    }

    let cas_ok = repository
        .compare_and_set_status(
            &job.occurrence_id,
            OccurrenceStatus::UnfilledAfterSMS,
            OccurrenceStatus::UnfilledAfterCalls,
        )
        .await?;
    if cas_ok {
        warn!("occurrence {} unfilled after {} outbound round(s)", job.occurrence_id, job.round_number);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Employee, OnCallWindow, OutboundCallingConfig, Patient, Provider, ShiftOccurrence,
        WaveDelayConfig,
    };
    use crate::queue::SqlxJobQueue;
    use crate::repository::SqlxRepository;
    use crate::sms::NullSmsAdapter;
    use crate::telephony::NullTelephonyAdapter;
    use chrono::{NaiveDate, NaiveTime};

    async fn seeded_unfilled() -> (SqlxRepository, SqlxJobQueue, Provider, ShiftOccurrence) {
        let repo = SqlxRepository::new_in_memory().await.unwrap();
        let queue = SqlxJobQueue::new(repo.pool().clone());

        let provider = Provider {
            id: "prov-1".into(),
            name: "Test".into(),
            phone_number: "+61291230000".into(),
            timezone: "Australia/Sydney".into(),
            transfer_number: None,
            ivr_greeting_text: "hi".into(),
            on_call_window: OnCallWindow {
                start_local: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                end_local: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                timezone: "Australia/Sydney".into(),
            },
            outbound_calling: OutboundCallingConfig {
                enabled: true,
                wait_minutes: 15,
                max_rounds: 2,
                message_template: "Shift available".into(),
            },
            wave_delays: WaveDelayConfig::default(),
        };
        repo.create_provider(&provider).await.unwrap();

        for (id, phone, opt_in) in [
            ("emp-1", "+61491570001", true),
            ("emp-2", "+61491570002", true),
        ] {
            repo.create_employee(&Employee {
                id: id.into(),
                provider_id: provider.id.clone(),
                display_name: id.into(),
                phone: phone.into(),
                pin: "1234".into(),
                active: true,
                outbound_call_opt_in: opt_in,
            })
            .await
            .unwrap();
        }

        let patient = Patient {
            id: "pat-1".into(),
            provider_id: provider.id.clone(),
            display_name: "Jane D.".into(),
            phone: "+61491570099".into(),
            dob: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
            staff_pool: vec!["emp-1".into(), "emp-2".into()],
        };
        repo.create_patient(&patient).await.unwrap();

        let occurrence = ShiftOccurrence {
            id: "occ-1".into(),
            template_id: None,
            patient_id: patient.id.clone(),
            provider_id: provider.id.clone(),
            assigned_employee_id: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            status: OccurrenceStatus::UnfilledAfterSMS,
            wave1_sent_at: Some(chrono::Utc::now()),
        };
        repo.create_shift_occurrence(&occurrence).await.unwrap();

        (repo, queue, provider, occurrence)
    }

    #[tokio::test]
    async fn dropped_when_already_assigned() {
        let (repo, queue, provider, occurrence) = seeded_unfilled().await;
        repo.compare_and_set_status(
            &occurrence.id,
            OccurrenceStatus::UnfilledAfterSMS,
            OccurrenceStatus::Assigned,
        )
        .await
        .unwrap();

        let telephony = NullTelephonyAdapter::default();
        let sms = NullSmsAdapter::default();
        let arbiter = crate::arbiter::spawn(
            std::sync::Arc::new(repo.clone()),
            std::sync::Arc::new(queue.clone()),
            std::sync::Arc::new(NullSmsAdapter::default()),
        );

        let job = first_job(&occurrence.id, &provider.id, vec!["emp-1".into(), "emp-2".into()]);
        handle_call_job(&repo, &queue, &telephony, &sms, &arbiter, &job)
            .await
            .unwrap();

        // No call log should have been written since the handler dropped the job early.
        let logs = repo.list_call_logs_for_provider(&provider.id).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn decline_advances_to_next_pool_member() {
        let (repo, queue, provider, occurrence) = seeded_unfilled().await;
        let telephony = NullTelephonyAdapter::default(); // NullTelephonyAdapter's gather_dtmf returns "" -> NoInput
        let sms = NullSmsAdapter::default();
        let arbiter = crate::arbiter::spawn(
            std::sync::Arc::new(repo.clone()),
            std::sync::Arc::new(queue.clone()),
            std::sync::Arc::new(NullSmsAdapter::default()),
        );

        let job = first_job(&occurrence.id, &provider.id, vec!["emp-1".into(), "emp-2".into()]);
        handle_call_job(&repo, &queue, &telephony, &sms, &arbiter, &job)
            .await
            .unwrap();

        let next = queue.dequeue_ready().await.unwrap();
        assert!(next.is_some(), "expected the next pool member's job to be enqueued with delay 0");
    }

    #[tokio::test]
    async fn exhausting_all_rounds_marks_unfilled_after_calls() {
        let (repo, queue, provider, occurrence) = seeded_unfilled().await;
        let telephony = NullTelephonyAdapter::default();
        let sms = NullSmsAdapter::default();
        let arbiter = crate::arbiter::spawn(
            std::sync::Arc::new(repo.clone()),
            std::sync::Arc::new(queue.clone()),
            std::sync::Arc::new(NullSmsAdapter::default()),
        );

        // Drain the whole 2-round x 2-member chain (4 jobs) by repeatedly dequeuing and
        // re-handling until the queue is empty.
        let mut job = first_job(&occurrence.id, &provider.id, vec!["emp-1".into(), "emp-2".into()]);
        loop {
            handle_call_job(&repo, &queue, &telephony, &sms, &arbiter, &job)
                .await
                .unwrap();
            match queue.dequeue_ready().await.unwrap() {
                Some(dequeued) => {
                    let JobPayload::Outbound(next) = dequeued.payload else {
                        panic!("expected outbound payload")
                    };
                    job = next;
                }
                None => break,
            }
        }

        let after = repo.get_occurrence(&occurrence.id).await.unwrap().unwrap();
        assert_eq!(after.status, OccurrenceStatus::UnfilledAfterCalls);
    }
}
