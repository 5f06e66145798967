//! Collaborators the engine consumes. In production these front a remote
//! backend; [`crate::store::InMemoryStore`] implements all of them.

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The write would overlap blocking appointments of the same staff member.
    #[error("write conflicts with {} appointment(s)", .0.len())]
    Conflict(Vec<Appointment>),
    #[error("appointment not found: {0}")]
    NotFound(Ulid),
    #[error("rejected: {0}")]
    Invalid(String),
    #[error("repository failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Appointments of `staff_id` whose span overlaps `span`, any status.
    async fn find_overlapping(
        &self,
        staff_id: Ulid,
        span: Span,
        exclude_id: Option<Ulid>,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, RepositoryError>;

    /// Insert. Unless `forced`, must reject overlap with blocking appointments
    /// atomically with the insert. A repeated idempotency key returns the
    /// original appointment of the same staff member; from any other staff
    /// member it is `Invalid`.
    async fn create(&self, appointment: NewAppointment) -> Result<Appointment, RepositoryError>;

    /// Move an existing appointment, with the same overlap guarantee as `create`.
    async fn reschedule(&self, id: Ulid, span: Span, forced: bool) -> Result<Appointment, RepositoryError>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn get_staff(&self, staff_id: Ulid) -> Option<Staff>;

    async fn exists(&self, staff_id: Ulid) -> bool {
        self.get_staff(staff_id).await.is_some()
    }
}

#[async_trait]
pub trait BusinessCalendar: Send + Sync {
    async fn get_business_day(&self, weekday: Weekday) -> Option<BusinessDay>;
    async fn get_exception(&self, date: NaiveDate) -> Option<ScheduleException>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(&self, service_id: Ulid) -> Option<Service>;

    /// Declared duration in minutes; `None` if the service does not exist.
    async fn get_duration(&self, service_id: Ulid, fallback_minutes: u32) -> Option<u32> {
        self.get_service(service_id)
            .await
            .map(|s| s.effective_duration(fallback_minutes))
    }
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn exists(&self, customer_id: Ulid) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Business-local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        chrono::Local::now().naive_local()
    }
}

/// Clock pinned to an instant; movable for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::RwLock<Instant>,
}

impl FixedClock {
    pub fn new(now: Instant) -> Self {
        Self {
            now: std::sync::RwLock::new(now),
        }
    }

    pub fn set(&self, now: Instant) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
