//! Repository (R).
//!
//! R is the only component that touches the backing record store; every other component
//! is tenancy-scoped through it. The trait exists so F/A/W/O are testable against an
//! in-memory SQLite pool without standing up a real file-backed database.

pub mod sqlx_impl;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{
    CallLog, Employee, EmployeeId, OccurrenceStatus, Patient, Provider, ShiftOccurrence,
    ShiftTemplate,
};
use crate::error::RepositoryResult;

pub use sqlx_impl::SqlxRepository;

#[async_trait]
pub trait Repository: Send + Sync {
    // --- spec §4.1 contractual operations -----------------------------------------

    /// Phone comparison uses normalised E.164; matching is provider-scoped.
    async fn find_employee_by_phone(
        &self,
        provider_id: &str,
        phone: &str,
    ) -> RepositoryResult<Option<Employee>>;

    /// Returns the first active match and signals ambiguity via `RepositoryError::Ambiguous`
    /// rather than panicking when older data violates the pin-uniqueness invariant.
    async fn find_employee_by_pin(
        &self,
        provider_id: &str,
        pin: &str,
    ) -> RepositoryResult<Option<Employee>>;

    /// Case-insensitive job-code lookup.
    async fn find_shift_template(
        &self,
        provider_id: &str,
        job_code: &str,
    ) -> RepositoryResult<Option<ShiftTemplate>>;

    /// Ascending by (scheduled_date, start_time); filtered to
    /// Scheduled/Assigned/Rescheduled; 14-day horizon.
    async fn list_upcoming_occurrences_for_employee(
        &self,
        provider_id: &str,
        employee_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<Vec<ShiftOccurrence>>;

    /// The sole primitive through which occurrence status ever changes. Succeeds iff the
    /// current status equals `expected`; a failed CAS is a clean no-op.
    async fn compare_and_set_status(
        &self,
        occurrence_id: &str,
        expected: OccurrenceStatus,
        next: OccurrenceStatus,
    ) -> RepositoryResult<bool>;

    // --- CRUD surface the above is built on (SPEC_FULL §C/R) -----------------------

    async fn create_provider(&self, provider: &Provider) -> RepositoryResult<()>;
    async fn get_provider(&self, provider_id: &str) -> RepositoryResult<Option<Provider>>;
    /// Resolves the tenancy boundary from the number a caller dialled, before any `CallSession` exists to carry a `provider_id`.
    async fn find_provider_by_phone(&self, phone_number: &str) -> RepositoryResult<Option<Provider>>;
    async fn update_provider_config(&self, provider: &Provider) -> RepositoryResult<()>;

    async fn create_employee(&self, employee: &Employee) -> RepositoryResult<()>;
    async fn get_employee(&self, employee_id: &str) -> RepositoryResult<Option<Employee>>;
    async fn list_employees_for_provider(
        &self,
        provider_id: &str,
    ) -> RepositoryResult<Vec<Employee>>;
    async fn deactivate_employee(&self, employee_id: &str) -> RepositoryResult<()>;

    async fn create_patient(&self, patient: &Patient) -> RepositoryResult<()>;
    async fn get_patient(&self, patient_id: &str) -> RepositoryResult<Option<Patient>>;
    async fn update_staff_pool(
        &self,
        patient_id: &str,
        staff_pool: &[EmployeeId],
    ) -> RepositoryResult<()>;

    async fn create_shift_template(&self, template: &ShiftTemplate) -> RepositoryResult<()>;
    async fn get_shift_template(
        &self,
        template_id: &str,
    ) -> RepositoryResult<Option<ShiftTemplate>>;

    async fn create_shift_occurrence(&self, occurrence: &ShiftOccurrence) -> RepositoryResult<()>;
    async fn get_occurrence(
        &self,
        occurrence_id: &str,
    ) -> RepositoryResult<Option<ShiftOccurrence>>;
    async fn update_occurrence_schedule(
        &self,
        occurrence_id: &str,
        scheduled_date: NaiveDate,
        start_time: chrono::NaiveTime,
    ) -> RepositoryResult<()>;
    async fn set_assigned_employee(
        &self,
        occurrence_id: &str,
        employee_id: &str,
    ) -> RepositoryResult<()>;
    /// Stamps when Wave 1's SMS fan-out went out, anchoring the 24h SMS-reply window
    /// (spec §4.7). Called once, from [`crate::wave::on_released`].
    async fn mark_wave1_sent(
        &self,
        occurrence_id: &str,
        sent_at: chrono::DateTime<chrono::Utc>,
    ) -> RepositoryResult<()>;

    async fn append_call_log(&self, log: &CallLog) -> RepositoryResult<()>;
    async fn finalize_call_log(
        &self,
        call_log_id: &str,
        ended_at: chrono::DateTime<chrono::Utc>,
        outcome: &str,
    ) -> RepositoryResult<()>;
    async fn get_call_log(&self, call_log_id: &str) -> RepositoryResult<Option<CallLog>>;

    // --- admin-visible read surface (SPEC_FULL §D) ----------------------------------

    async fn list_occurrences_by_status(
        &self,
        provider_id: &str,
        status: OccurrenceStatus,
    ) -> RepositoryResult<Vec<ShiftOccurrence>>;
    async fn list_call_logs_for_provider(
        &self,
        provider_id: &str,
    ) -> RepositoryResult<Vec<CallLog>>;
}
