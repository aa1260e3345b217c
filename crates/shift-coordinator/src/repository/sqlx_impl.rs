//! `SqlxRepository` — the production [`super::Repository`] implementation.
//!
//! Queries are plain `sqlx::query(...).bind(...)` with manual row mapping rather than the
//! `query!`/`query_as!` compile-time-checked macros: those require a live database
//! connection (or a checked-in `.sqlx` metadata cache) at build time, which this workspace
//! does not assume, so we standardise on the plain style everywhere instead.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::{
    CallDirection, CallLog, Employee, OccurrenceStatus, OnCallWindow, OutboundCallingConfig,
    Patient, Provider, ShiftOccurrence, ShiftTemplate, WaveDelayConfig,
};
use crate::error::{RepositoryError, RepositoryResult};

use super::Repository;

#[derive(Clone)]
pub struct SqlxRepository {
    pool: SqlitePool,
}

impl SqlxRepository {
    /// Connect and run migrations. `database_url` is anything sqlx's SQLite driver
    /// accepts, including `sqlite::memory:`.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        info!("connecting to {}", database_url);
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> anyhow::Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_date(s: &str) -> RepositoryResult<NaiveDate> {
    s.parse()
        .map_err(|_| RepositoryError::BackendUnavailable(format!("bad date {s}")))
}

fn parse_time(s: &str) -> RepositoryResult<NaiveTime> {
    s.parse()
        .map_err(|_| RepositoryError::BackendUnavailable(format!("bad time {s}")))
}

fn parse_datetime_utc(s: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::BackendUnavailable(format!("bad timestamp {s}")))
}

fn provider_from_row(row: SqliteRow) -> RepositoryResult<Provider> {
    Ok(Provider {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone_number: row.try_get("phone_number")?,
        timezone: row.try_get("timezone")?,
        transfer_number: row.try_get("transfer_number")?,
        ivr_greeting_text: row.try_get("ivr_greeting_text")?,
        on_call_window: OnCallWindow {
            start_local: parse_time(row.try_get::<String, _>("on_call_start")?.as_str())?,
            end_local: parse_time(row.try_get::<String, _>("on_call_end")?.as_str())?,
            timezone: row.try_get("on_call_timezone")?,
        },
        outbound_calling: OutboundCallingConfig {
            enabled: row.try_get::<i64, _>("outbound_enabled")? != 0,
            wait_minutes: row.try_get::<i64, _>("outbound_wait_minutes")? as i32,
            max_rounds: row.try_get::<i64, _>("outbound_max_rounds")? as i32,
            message_template: row.try_get("outbound_message_template")?,
        },
        wave_delays: WaveDelayConfig {
            wave2_minutes: row.try_get::<i64, _>("wave2_delay_minutes")? as i32,
            wave3_minutes: row.try_get::<i64, _>("wave3_delay_minutes")? as i32,
        },
    })
}

fn employee_from_row(row: SqliteRow) -> RepositoryResult<Employee> {
    Ok(Employee {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        display_name: row.try_get("display_name")?,
        phone: row.try_get("phone")?,
        pin: row.try_get("pin")?,
        active: row.try_get::<i64, _>("active")? != 0,
        outbound_call_opt_in: row.try_get::<i64, _>("outbound_call_opt_in")? != 0,
    })
}

fn patient_from_row(row: SqliteRow) -> RepositoryResult<Patient> {
    let staff_pool_json: String = row.try_get("staff_pool_json")?;
    let staff_pool = serde_json::from_str(&staff_pool_json)
        .map_err(|e| RepositoryError::BackendUnavailable(e.to_string()))?;
    Ok(Patient {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        display_name: row.try_get("display_name")?,
        phone: row.try_get("phone")?,
        dob: parse_date(row.try_get::<String, _>("dob")?.as_str())?,
        staff_pool,
    })
}

fn template_from_row(row: SqliteRow) -> RepositoryResult<ShiftTemplate> {
    Ok(ShiftTemplate {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        patient_id: row.try_get("patient_id")?,
        default_employee_id: row.try_get("default_employee_id")?,
        job_code: row.try_get("job_code")?,
        start_of_day: parse_time(row.try_get::<String, _>("start_of_day")?.as_str())?,
        end_of_day: parse_time(row.try_get::<String, _>("end_of_day")?.as_str())?,
    })
}

fn occurrence_from_row(row: SqliteRow) -> RepositoryResult<ShiftOccurrence> {
    let status_str: String = row.try_get("status")?;
    let status = OccurrenceStatus::from_str(&status_str)
        .ok_or_else(|| RepositoryError::BackendUnavailable(format!("bad status {status_str}")))?;
    let wave1_sent_at_str: Option<String> = row.try_get("wave1_sent_at")?;
    Ok(ShiftOccurrence {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        patient_id: row.try_get("patient_id")?,
        provider_id: row.try_get("provider_id")?,
        assigned_employee_id: row.try_get("assigned_employee_id")?,
        scheduled_date: parse_date(row.try_get::<String, _>("scheduled_date")?.as_str())?,
        start_time: parse_time(row.try_get::<String, _>("start_time")?.as_str())?,
        end_time: parse_time(row.try_get::<String, _>("end_time")?.as_str())?,
        status,
        wave1_sent_at: wave1_sent_at_str.map(|s| parse_datetime_utc(&s)).transpose()?,
    })
}

fn call_log_from_row(row: SqliteRow) -> RepositoryResult<CallLog> {
    let direction_str: String = row.try_get("direction")?;
    let direction = match direction_str.as_str() {
        "INBOUND" => CallDirection::Inbound,
        _ => CallDirection::Outbound,
    };
    let started_at_str: String = row.try_get("started_at")?;
    let ended_at_str: Option<String> = row.try_get("ended_at")?;
    Ok(CallLog {
        id: row.try_get("id")?,
        call_id: row.try_get("call_id")?,
        direction,
        provider_id: row.try_get("provider_id")?,
        employee_id: row.try_get("employee_id")?,
        patient_id: row.try_get("patient_id")?,
        started_at: parse_datetime_utc(&started_at_str)?,
        ended_at: ended_at_str.map(|s| parse_datetime_utc(&s)).transpose()?,
        purpose: row.try_get("purpose")?,
        outcome: row.try_get("outcome")?,
        dtmf_response: row.try_get("dtmf_response")?,
        attempt_round: row.try_get::<Option<i64>, _>("attempt_round")?.map(|v| v as i32),
        recording_ref: row.try_get("recording_ref")?,
    })
}

#[async_trait]
impl Repository for SqlxRepository {
    async fn find_employee_by_phone(
        &self,
        provider_id: &str,
        phone: &str,
    ) -> RepositoryResult<Option<Employee>> {
        let row = sqlx::query(
            "SELECT * FROM employees WHERE provider_id = ? AND phone = ? AND active = 1 LIMIT 1",
        )
        .bind(provider_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.map(employee_from_row).transpose()
    }

    async fn find_employee_by_pin(
        &self,
        provider_id: &str,
        pin: &str,
    ) -> RepositoryResult<Option<Employee>> {
        let rows = sqlx::query(
            "SELECT * FROM employees WHERE provider_id = ? AND pin = ? AND active = 1 ORDER BY id",
        )
        .bind(provider_id)
        .bind(pin)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            warn!(
                "pin collision for provider {} pin {} across {} active employees",
                provider_id,
                pin,
                rows.len()
            );
            return Err(RepositoryError::Ambiguous(format!(
                "{} active employees share pin {} for provider {}",
                rows.len(),
                pin,
                provider_id
            )));
        }
        rows.into_iter().next().map(employee_from_row).transpose()
    }

    async fn find_shift_template(
        &self,
        provider_id: &str,
        job_code: &str,
    ) -> RepositoryResult<Option<ShiftTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM shift_templates WHERE provider_id = ? AND job_code_lower = ? LIMIT 1",
        )
        .bind(provider_id)
        .bind(job_code.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.map(template_from_row).transpose()
    }

    async fn list_upcoming_occurrences_for_employee(
        &self,
        provider_id: &str,
        employee_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<Vec<ShiftOccurrence>> {
        let horizon = now.date() + chrono::Duration::days(crate::constants::UPCOMING_OCCURRENCE_HORIZON_DAYS);
        let rows = sqlx::query(
            "SELECT * FROM shift_occurrences \
             WHERE provider_id = ? AND assigned_employee_id = ? \
             AND status IN ('SCHEDULED', 'ASSIGNED', 'RESCHEDULED') \
             AND scheduled_date <= ? \
             ORDER BY scheduled_date ASC, start_time ASC",
        )
        .bind(provider_id)
        .bind(employee_id)
        .bind(horizon.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut occurrences = Vec::new();
        for row in rows {
            let occurrence = occurrence_from_row(row)?;
            let scheduled_at = NaiveDateTime::new(occurrence.scheduled_date, occurrence.start_time);
            if scheduled_at >= now {
                occurrences.push(occurrence);
            }
        }
        Ok(occurrences)
    }

    async fn compare_and_set_status(
        &self,
        occurrence_id: &str,
        expected: OccurrenceStatus,
        next: OccurrenceStatus,
    ) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE shift_occurrences SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(occurrence_id)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?;

        let success = result.rows_affected() > 0;
        if success {
            tx.commit().await?;
            debug!(
                "occurrence {} {} -> {}",
                occurrence_id,
                expected.as_str(),
                next.as_str()
            );
        } else {
            tx.rollback().await?;
        }
        Ok(success)
    }

    async fn create_provider(&self, provider: &Provider) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO providers (id, name, phone_number, timezone, transfer_number, ivr_greeting_text, \
             on_call_start, on_call_end, on_call_timezone, outbound_enabled, \
             outbound_wait_minutes, outbound_max_rounds, outbound_message_template, \
             wave2_delay_minutes, wave3_delay_minutes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&provider.id)
        .bind(&provider.name)
        .bind(&provider.phone_number)
        .bind(&provider.timezone)
        .bind(&provider.transfer_number)
        .bind(&provider.ivr_greeting_text)
        .bind(provider.on_call_window.start_local.to_string())
        .bind(provider.on_call_window.end_local.to_string())
        .bind(&provider.on_call_window.timezone)
        .bind(provider.outbound_calling.enabled as i64)
        .bind(provider.outbound_calling.wait_minutes)
        .bind(provider.outbound_calling.max_rounds)
        .bind(&provider.outbound_calling.message_template)
        .bind(provider.wave_delays.wave2_minutes)
        .bind(provider.wave_delays.wave3_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_provider(&self, provider_id: &str) -> RepositoryResult<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE id = ?")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(provider_from_row).transpose()
    }

    async fn find_provider_by_phone(&self, phone_number: &str) -> RepositoryResult<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE phone_number = ?")
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(provider_from_row).transpose()
    }

    async fn update_provider_config(&self, provider: &Provider) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE providers SET name = ?, phone_number = ?, timezone = ?, transfer_number = ?, \
             ivr_greeting_text = ?, on_call_start = ?, on_call_end = ?, on_call_timezone = ?, \
             outbound_enabled = ?, outbound_wait_minutes = ?, outbound_max_rounds = ?, \
             outbound_message_template = ?, wave2_delay_minutes = ?, wave3_delay_minutes = ? \
             WHERE id = ?",
        )
        .bind(&provider.name)
        .bind(&provider.phone_number)
        .bind(&provider.timezone)
        .bind(&provider.transfer_number)
        .bind(&provider.ivr_greeting_text)
        .bind(provider.on_call_window.start_local.to_string())
        .bind(provider.on_call_window.end_local.to_string())
        .bind(&provider.on_call_window.timezone)
        .bind(provider.outbound_calling.enabled as i64)
        .bind(provider.outbound_calling.wait_minutes)
        .bind(provider.outbound_calling.max_rounds)
        .bind(&provider.outbound_calling.message_template)
        .bind(provider.wave_delays.wave2_minutes)
        .bind(provider.wave_delays.wave3_minutes)
        .bind(&provider.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_employee(&self, employee: &Employee) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO employees (id, provider_id, display_name, phone, pin, active, \
             outbound_call_opt_in) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&employee.id)
        .bind(&employee.provider_id)
        .bind(&employee.display_name)
        .bind(&employee.phone)
        .bind(&employee.pin)
        .bind(employee.active as i64)
        .bind(employee.outbound_call_opt_in as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_employee(&self, employee_id: &str) -> RepositoryResult<Option<Employee>> {
        let row = sqlx::query("SELECT * FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(employee_from_row).transpose()
    }

    async fn list_employees_for_provider(
        &self,
        provider_id: &str,
    ) -> RepositoryResult<Vec<Employee>> {
        let rows = sqlx::query("SELECT * FROM employees WHERE provider_id = ? ORDER BY display_name")
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(employee_from_row).collect()
    }

    async fn deactivate_employee(&self, employee_id: &str) -> RepositoryResult<()> {
        sqlx::query("UPDATE employees SET active = 0 WHERE id = ?")
            .bind(employee_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_patient(&self, patient: &Patient) -> RepositoryResult<()> {
        let staff_pool_json = serde_json::to_string(&patient.staff_pool)
            .map_err(|e| RepositoryError::BackendUnavailable(e.to_string()))?;
        sqlx::query(
            "INSERT INTO patients (id, provider_id, display_name, phone, dob, staff_pool_json) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&patient.id)
        .bind(&patient.provider_id)
        .bind(&patient.display_name)
        .bind(&patient.phone)
        .bind(patient.dob.to_string())
        .bind(staff_pool_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_patient(&self, patient_id: &str) -> RepositoryResult<Option<Patient>> {
        let row = sqlx::query("SELECT * FROM patients WHERE id = ?")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(patient_from_row).transpose()
    }

    async fn update_staff_pool(
        &self,
        patient_id: &str,
        staff_pool: &[String],
    ) -> RepositoryResult<()> {
        let staff_pool_json = serde_json::to_string(staff_pool)
            .map_err(|e| RepositoryError::BackendUnavailable(e.to_string()))?;
        sqlx::query("UPDATE patients SET staff_pool_json = ? WHERE id = ?")
            .bind(staff_pool_json)
            .bind(patient_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_shift_template(&self, template: &ShiftTemplate) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO shift_templates (id, provider_id, patient_id, default_employee_id, \
             job_code, job_code_lower, start_of_day, end_of_day) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&template.id)
        .bind(&template.provider_id)
        .bind(&template.patient_id)
        .bind(&template.default_employee_id)
        .bind(&template.job_code)
        .bind(template.job_code.to_ascii_lowercase())
        .bind(template.start_of_day.to_string())
        .bind(template.end_of_day.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_shift_template(
        &self,
        template_id: &str,
    ) -> RepositoryResult<Option<ShiftTemplate>> {
        let row = sqlx::query("SELECT * FROM shift_templates WHERE id = ?")
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(template_from_row).transpose()
    }

    async fn create_shift_occurrence(&self, occurrence: &ShiftOccurrence) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO shift_occurrences (id, template_id, patient_id, provider_id, \
             assigned_employee_id, scheduled_date, start_time, end_time, status, wave1_sent_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&occurrence.id)
        .bind(&occurrence.template_id)
        .bind(&occurrence.patient_id)
        .bind(&occurrence.provider_id)
        .bind(&occurrence.assigned_employee_id)
        .bind(occurrence.scheduled_date.to_string())
        .bind(occurrence.start_time.to_string())
        .bind(occurrence.end_time.to_string())
        .bind(occurrence.status.as_str())
        .bind(occurrence.wave1_sent_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_occurrence(
        &self,
        occurrence_id: &str,
    ) -> RepositoryResult<Option<ShiftOccurrence>> {
        let row = sqlx::query("SELECT * FROM shift_occurrences WHERE id = ?")
            .bind(occurrence_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(occurrence_from_row).transpose()
    }

    async fn update_occurrence_schedule(
        &self,
        occurrence_id: &str,
        scheduled_date: NaiveDate,
        start_time: NaiveTime,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE shift_occurrences SET scheduled_date = ?, start_time = ? WHERE id = ?")
            .bind(scheduled_date.to_string())
            .bind(start_time.to_string())
            .bind(occurrence_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_assigned_employee(
        &self,
        occurrence_id: &str,
        employee_id: &str,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE shift_occurrences SET assigned_employee_id = ? WHERE id = ?")
            .bind(employee_id)
            .bind(occurrence_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_wave1_sent(
        &self,
        occurrence_id: &str,
        sent_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE shift_occurrences SET wave1_sent_at = ? WHERE id = ?")
            .bind(sent_at.to_rfc3339())
            .bind(occurrence_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_call_log(&self, log: &CallLog) -> RepositoryResult<()> {
        let direction_str = match log.direction {
            CallDirection::Inbound => "INBOUND",
            CallDirection::Outbound => "OUTBOUND",
        };
        sqlx::query(
            "INSERT INTO call_logs (id, call_id, direction, provider_id, employee_id, \
             patient_id, started_at, ended_at, purpose, outcome, dtmf_response, attempt_round, \
             recording_ref) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(&log.call_id)
        .bind(direction_str)
        .bind(&log.provider_id)
        .bind(&log.employee_id)
        .bind(&log.patient_id)
        .bind(log.started_at.to_rfc3339())
        .bind(log.ended_at.map(|dt| dt.to_rfc3339()))
        .bind(&log.purpose)
        .bind(&log.outcome)
        .bind(&log.dtmf_response)
        .bind(log.attempt_round)
        .bind(&log.recording_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_call_log(
        &self,
        call_log_id: &str,
        ended_at: DateTime<Utc>,
        outcome: &str,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE call_logs SET ended_at = ?, outcome = ? WHERE id = ?")
            .bind(ended_at.to_rfc3339())
            .bind(outcome)
            .bind(call_log_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_call_log(&self, call_log_id: &str) -> RepositoryResult<Option<CallLog>> {
        let row = sqlx::query("SELECT * FROM call_logs WHERE id = ?")
            .bind(call_log_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(call_log_from_row).transpose()
    }

    async fn list_occurrences_by_status(
        &self,
        provider_id: &str,
        status: OccurrenceStatus,
    ) -> RepositoryResult<Vec<ShiftOccurrence>> {
        let rows = sqlx::query(
            "SELECT * FROM shift_occurrences WHERE provider_id = ? AND status = ? \
             ORDER BY scheduled_date, start_time",
        )
        .bind(provider_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(occurrence_from_row).collect()
    }

    async fn list_call_logs_for_provider(
        &self,
        provider_id: &str,
    ) -> RepositoryResult<Vec<CallLog>> {
        let rows = sqlx::query("SELECT * FROM call_logs WHERE provider_id = ? ORDER BY started_at DESC")
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(call_log_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OccurrenceStatus, Provider, ShiftOccurrence};

    async fn seed_provider(repo: &SqlxRepository) -> Provider {
        let provider = Provider {
            id: "prov-1".to_string(),
            name: "Test Provider".to_string(),
            phone_number: "+61291230000".to_string(),
            timezone: "Australia/Sydney".to_string(),
            transfer_number: None,
            ivr_greeting_text: "Welcome".to_string(),
            on_call_window: OnCallWindow {
                start_local: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                end_local: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                timezone: "Australia/Sydney".to_string(),
            },
            outbound_calling: OutboundCallingConfig {
                enabled: true,
                wait_minutes: 15,
                max_rounds: 3,
                message_template: "Shift available".to_string(),
            },
            wave_delays: crate::domain::WaveDelayConfig::default(),
        };
        repo.create_provider(&provider).await.unwrap();
        provider
    }

    #[tokio::test]
    async fn compare_and_set_status_only_succeeds_on_match() {
        let repo = SqlxRepository::new_in_memory().await.unwrap();
        seed_provider(&repo).await;
        let occurrence = ShiftOccurrence {
            id: "occ-1".to_string(),
            template_id: None,
            patient_id: "pat-1".to_string(),
            provider_id: "prov-1".to_string(),
            assigned_employee_id: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            status: OccurrenceStatus::Scheduled,
            wave1_sent_at: None,
        };
        sqlx::query(
            "INSERT INTO patients (id, provider_id, display_name, phone, dob, staff_pool_json) \
             VALUES ('pat-1', 'prov-1', 'P', '+61491570006', '2000-01-01', '[]')",
        )
        .execute(repo.pool())
        .await
        .unwrap();
        repo.create_shift_occurrence(&occurrence).await.unwrap();

        let wrong = repo
            .compare_and_set_status("occ-1", OccurrenceStatus::Open, OccurrenceStatus::Assigned)
            .await
            .unwrap();
        assert!(!wrong);

        let right = repo
            .compare_and_set_status(
                "occ-1",
                OccurrenceStatus::Scheduled,
                OccurrenceStatus::Open,
            )
            .await
            .unwrap();
        assert!(right);

        let fetched = repo.get_occurrence("occ-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, OccurrenceStatus::Open);
    }

    #[tokio::test]
    async fn find_employee_by_phone_is_provider_scoped() {
        let repo = SqlxRepository::new_in_memory().await.unwrap();
        seed_provider(&repo).await;
        let employee = Employee {
            id: "emp-1".to_string(),
            provider_id: "prov-1".to_string(),
            display_name: "Alice".to_string(),
            phone: "+61491570006".to_string(),
            pin: "1234".to_string(),
            active: true,
            outbound_call_opt_in: true,
        };
        repo.create_employee(&employee).await.unwrap();

        let found = repo
            .find_employee_by_phone("prov-1", "+61491570006")
            .await
            .unwrap();
        assert!(found.is_some());

        let not_found = repo
            .find_employee_by_phone("other-provider", "+61491570006")
            .await
            .unwrap();
        assert!(not_found.is_none());
    }
}
