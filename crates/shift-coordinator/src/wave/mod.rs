//! Wave Scheduler (W).
//!
//! Triggered by [`crate::arbiter`] on a successful Release transition. Enqueues Wave 1
//! immediately (sending SMS inline, running the immediate side effect before scheduling the
//! delayed ones) and schedules Waves 2 and 3 on [`crate::queue::JobQueue`], each re-checking
//! occurrence status at dequeue.

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{OccurrenceStatus, OutboundCallJob, WaveJob, WaveNumber};
use crate::queue::{JobPayload, JobQueue};
use crate::repository::Repository;
use crate::sms::SmsAdapter;

fn wave_key(occurrence_id: &str, wave: WaveNumber) -> String {
    format!("shift:{occurrence_id}:wave:{}", wave as i32)
}

/// Called by the Arbiter right after a Release CAS succeeds. Sends Wave 1 inline, then
/// schedules Waves 2 and 3 via Q.
pub async fn on_released(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    sms: &dyn SmsAdapter,
    occurrence_id: &str,
) -> anyhow::Result<()> {
    let occurrence = repository
        .get_occurrence(occurrence_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("occurrence {occurrence_id} vanished before wave 1"))?;
    let patient = repository
        .get_patient(&occurrence.patient_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("patient {} missing", occurrence.patient_id))?;
    let provider = repository
        .get_provider(&occurrence.provider_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("provider {} missing", occurrence.provider_id))?;

    // Empty pool: no sends at any wave, no later waves scheduled, mark UnfilledAfterSMS
    // immediately so admins see the gap rather than the shift sitting silently Open forever.
    if patient.staff_pool.is_empty() {
        warn!(
            "occurrence {} has an empty staff pool, skipping all waves",
            occurrence_id
        );
        repository
            .compare_and_set_status(
                occurrence_id,
                OccurrenceStatus::Open,
                OccurrenceStatus::UnfilledAfterSMS,
            )
            .await?;
        return Ok(());
    }

    send_wave(
        repository,
        sms,
        &provider.id,
        occurrence_id,
        WaveNumber::One,
        &patient.staff_pool,
    )
    .await?;
    repository
        .mark_wave1_sent(occurrence_id, chrono::Utc::now())
        .await?;

    let wave2_job = WaveJob {
        occurrence_id: occurrence_id.to_string(),
        wave_number: WaveNumber::Two,
        staff_pool_snapshot: patient.staff_pool.clone(),
        provider_id: provider.id.clone(),
    };
    queue
        .enqueue(
            &wave_key(occurrence_id, WaveNumber::Two),
            JobPayload::Wave(wave2_job),
            Duration::from_secs(provider.wave_delays.wave2_minutes as u64 * 60),
        )
        .await?;

    let wave3_job = WaveJob {
        occurrence_id: occurrence_id.to_string(),
        wave_number: WaveNumber::Three,
        staff_pool_snapshot: patient.staff_pool.clone(),
        provider_id: provider.id.clone(),
    };
    queue
        .enqueue(
            &wave_key(occurrence_id, WaveNumber::Three),
            JobPayload::Wave(wave3_job),
            Duration::from_secs(provider.wave_delays.wave3_minutes as u64 * 60),
        )
        .await?;

    info!("occurrence {} released: wave 1 sent, waves 2/3 scheduled", occurrence_id);
    Ok(())
}

/// Renders and sends the SMS body to every pool member, using the provider's configured
/// template with variable substitution.
async fn send_wave(
    repository: &dyn Repository,
    sms: &dyn SmsAdapter,
    provider_id: &str,
    occurrence_id: &str,
    wave: WaveNumber,
    pool: &[String],
) -> anyhow::Result<()> {
    let occurrence = repository
        .get_occurrence(occurrence_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("occurrence {occurrence_id} missing"))?;
    let patient = repository
        .get_patient(&occurrence.patient_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("patient missing"))?;
    let provider = repository
        .get_provider(provider_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("provider missing"))?;

    let date = occurrence.scheduled_date.to_string();
    let start_time = occurrence.start_time.format("%H:%M").to_string();
    let end_time = occurrence.end_time.format("%H:%M").to_string();

    for employee_id in pool {
        let Some(employee) = repository.get_employee(employee_id).await? else {
            warn!("wave {:?} skipping missing employee {}", wave, employee_id);
            continue;
        };
        let body = crate::sms::render_template(
            &provider.outbound_calling.message_template,
            &[
                ("employeeName", employee.display_name.as_str()),
                ("patientName", patient.display_name.as_str()),
                ("date", date.as_str()),
                ("time", start_time.as_str()),
                ("startTime", start_time.as_str()),
                ("endTime", end_time.as_str()),
                ("suburb", ""),
            ],
        );
        if let Err(e) = sms.send(&employee.phone, &body).await {
            warn!("wave {:?} SMS send to {} failed: {}", wave, employee.phone, e);
        }
    }
    Ok(())
}

/// Handles a dequeued [`WaveJob`]: re-reads the occurrence, proceeds only if it's still
/// Open, sends to the snapshot pool, and — for Wave 3 — decides between scheduling the
/// outbound escalation or finalising as `UnfilledAfterSMS`.
pub async fn handle_wave_job(
    repository: &dyn Repository,
    queue: &dyn JobQueue,
    sms: &dyn SmsAdapter,
    job: &WaveJob,
) -> anyhow::Result<()> {
    let occurrence = repository
        .get_occurrence(&job.occurrence_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("occurrence {} missing", job.occurrence_id))?;

    if occurrence.status != OccurrenceStatus::Open {
        info!(
            "wave {:?} for {} dropped: status is {:?}, not Open",
            job.wave_number, job.occurrence_id, occurrence.status
        );
        return Ok(());
    }

    send_wave(
        repository,
        sms,
        &job.provider_id,
        &job.occurrence_id,
        job.wave_number,
        &job.staff_pool_snapshot,
    )
    .await?;

    if job.wave_number != WaveNumber::Three {
        return Ok(());
    }

    let provider = repository
        .get_provider(&job.provider_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("provider {} missing", job.provider_id))?;

    let cas_ok = repository
        .compare_and_set_status(
            &job.occurrence_id,
            OccurrenceStatus::Open,
            OccurrenceStatus::UnfilledAfterSMS,
        )
        .await?;
    if !cas_ok {
        // Someone won the race between the re-read above and this CAS (e.g. an SMS
        // reply accepted in the meantime). Nothing further for W to do.
        return Ok(());
    }

    if provider.outbound_calling.enabled && provider.outbound_calling.is_valid() {
        let job0 = OutboundCallJob {
            occurrence_id: job.occurrence_id.clone(),
            round_number: 1,
            pool_index: 0,
            pool_snapshot: job.staff_pool_snapshot.clone(),
            provider_id: job.provider_id.clone(),
        };
        queue
            .enqueue(
                &format!("shift:{}:call:1:0", job.occurrence_id),
                JobPayload::Outbound(job0),
                Duration::from_secs(provider.outbound_calling.wait_minutes as u64 * 60),
            )
            .await?;
        info!(
            "occurrence {} unfilled after SMS, outbound calling scheduled in {}m",
            job.occurrence_id, provider.outbound_calling.wait_minutes
        );
    } else {
        if provider.outbound_calling.enabled {
            warn!(
                "provider {} has outbound calling enabled but an invalid config, stopping at UnfilledAfterSMS",
                provider.id
            );
        }
        info!("occurrence {} unfilled after SMS, outbound calling not scheduled", job.occurrence_id);
    }

    Ok(())
}
