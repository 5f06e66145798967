use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Appointment, WorkingWindow};
use crate::ports::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Staff,
    Customer,
    Service,
    Appointment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Staff => "staff",
            EntityKind::Customer => "customer",
            EntityKind::Service => "service",
            EntityKind::Appointment => "appointment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),
    /// Never bypassed, not even by force-create.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Ulid },
    #[error("closed on {date}")]
    ClosedDay { date: NaiveDate },
    #[error("outside working hours ({window})")]
    OutsideWorkingHours { window: WorkingWindow },
    #[error("conflicts with {} appointment(s)", conflicts.len())]
    Conflict { conflicts: Vec<Appointment> },
    #[error("no available slot within the search horizon")]
    NoAvailableSlot,
    #[error("repository error: {0}")]
    Repository(String),
}

impl BookingError {
    pub(crate) fn not_found(kind: EntityKind, id: Ulid) -> Self {
        BookingError::NotFound { kind, id }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation",
            BookingError::NotFound { .. } => "not_found",
            BookingError::ClosedDay { .. } => "closed_day",
            BookingError::OutsideWorkingHours { .. } => "outside_hours",
            BookingError::Conflict { .. } => "conflict",
            BookingError::NoAvailableSlot => "no_slot",
            BookingError::Repository(_) => "repository",
        }
    }
}

impl From<RepositoryError> for BookingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(conflicts) => BookingError::Conflict { conflicts },
            RepositoryError::NotFound(id) => BookingError::not_found(EntityKind::Appointment, id),
            RepositoryError::Invalid(msg) => BookingError::Validation(msg),
            RepositoryError::Backend(msg) => BookingError::Repository(msg),
        }
    }
}
