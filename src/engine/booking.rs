use chrono::Datelike;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::ScheduleEvent;

use super::availability::{Availability, UnavailableReason};
use super::error::EntityKind;
use super::slots::SearchOptions;
use super::{BookingError, Engine};

/// What to do when the requested time cannot be booked as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingMode {
    /// Hours problems are terminal; a conflict still yields a proposal.
    #[default]
    Exact,
    /// Any problem yields a proposal for the caller to confirm.
    Suggest,
    /// Any problem books the first slot found; the request pre-approves it.
    AutoBook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub staff_id: Ulid,
    pub customer_id: Ulid,
    pub service_id: Ulid,
    pub start: Instant,
    pub mode: SchedulingMode,
    /// Skip hours and conflict checks. Existence checks still apply.
    pub force_create: bool,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub idempotency_key: Option<String>,
    /// Move this appointment instead of creating a new one.
    pub reschedule_of: Option<Ulid>,
}

impl BookingRequest {
    pub fn new(staff_id: Ulid, customer_id: Ulid, service_id: Ulid, start: Instant) -> Self {
        Self {
            staff_id,
            customer_id,
            service_id,
            start,
            mode: SchedulingMode::Exact,
            force_create: false,
            status: AppointmentStatus::Pending,
            notes: None,
            idempotency_key: None,
            reschedule_of: None,
        }
    }

    /// Book `service_id` for the same customer and staff member right after
    /// `previous` ends, taking the first opening if that time is taken.
    pub fn following(previous: &Appointment, service_id: Ulid) -> Self {
        Self::new(previous.staff_id, previous.customer_id, service_id, previous.span.end)
            .with_mode(SchedulingMode::AutoBook)
            .with_status(previous.status)
    }

    /// Move an existing appointment of the same staff member to `start`.
    pub fn reschedule(appointment: &Appointment, start: Instant) -> Self {
        let mut req = Self::new(appointment.staff_id, appointment.customer_id, appointment.service_id, start)
            .with_status(appointment.status);
        req.reschedule_of = Some(appointment.id);
        req
    }

    pub fn with_mode(mut self, mode: SchedulingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_create = true;
        self
    }

    pub fn with_status(mut self, status: AppointmentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Same request, starting at an accepted proposal.
    pub fn accept(mut self, proposal: &Proposal) -> Self {
        self.start = proposal.slot.start;
        self
    }
}

/// Alternative offered instead of the requested time. Nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub slot: Span,
    /// Why the requested time was refused.
    pub reason: UnavailableReason,
    pub window: Option<WorkingWindow>,
    pub conflicts: Vec<Appointment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(Appointment),
    /// Awaiting confirmation: re-invoke with the slot or with `force_create`.
    Proposed(Proposal),
}

impl BookingOutcome {
    fn label(&self) -> &'static str {
        match self {
            BookingOutcome::Booked(_) => "booked",
            BookingOutcome::Proposed(_) => "proposed",
        }
    }
}

pub(crate) fn validate_request(req: &BookingRequest) -> Result<(), BookingError> {
    if req.staff_id.is_nil() {
        return Err(BookingError::Validation("staff id is required".into()));
    }
    if req.customer_id.is_nil() {
        return Err(BookingError::Validation("customer id is required".into()));
    }
    if req.service_id.is_nil() {
        return Err(BookingError::Validation("service id is required".into()));
    }
    if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&req.start.year()) {
        return Err(BookingError::Validation(format!("start {} out of range", req.start)));
    }
    if !req.status.is_blocking() {
        return Err(BookingError::Validation(format!(
            "cannot book with status {}",
            req.status.label()
        )));
    }
    if req.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(BookingError::Validation("notes too long".into()));
    }
    if let Some(key) = &req.idempotency_key
        && (key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN)
    {
        return Err(BookingError::Validation("idempotency key must be 1..=256 bytes".into()));
    }
    Ok(())
}

impl Engine {
    /// Create or reschedule an appointment.
    ///
    /// Validates, then either persists directly (`force_create`), persists
    /// after a clean availability check, or searches for an alternative. An
    /// alternative is only written without a second call in
    /// [`SchedulingMode::AutoBook`].
    pub async fn book(&self, request: BookingRequest) -> Result<BookingOutcome, BookingError> {
        let started = std::time::Instant::now();
        let result = self.run_booking(&request).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.label(),
        };
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => label).increment(1);
        metrics::histogram!(crate::observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(BookingOutcome::Booked(a)) => info!(
                "booked {} for staff {} [{}, {}) forced={}",
                a.id, a.staff_id, a.span.start, a.span.end, a.forced
            ),
            Ok(BookingOutcome::Proposed(p)) => debug!(
                "proposed [{}, {}) to staff {} ({})",
                p.slot.start,
                p.slot.end,
                request.staff_id,
                p.reason.label()
            ),
            Err(e) => debug!("booking for staff {} refused: {e}", request.staff_id),
        }
        result
    }

    async fn run_booking(&self, req: &BookingRequest) -> Result<BookingOutcome, BookingError> {
        // ── Validating ──
        validate_request(req)?;
        if !self.staff.exists(req.staff_id).await {
            return Err(BookingError::not_found(EntityKind::Staff, req.staff_id));
        }
        if !self.customers.exists(req.customer_id).await {
            return Err(BookingError::not_found(EntityKind::Customer, req.customer_id));
        }
        let duration = self
            .services
            .get_duration(req.service_id, self.config.default_service_duration_minutes)
            .await
            .ok_or(BookingError::not_found(EntityKind::Service, req.service_id))?;
        if duration > MAX_SERVICE_DURATION_MINUTES {
            return Err(BookingError::Validation(format!("service duration {duration} too long")));
        }

        let previous = match req.reschedule_of {
            Some(id) => Some(self.load_for_reschedule(id, req.staff_id).await?),
            None => None,
        };

        let span = Span::starting_at(req.start, duration);

        if req.force_create {
            warn!(
                "force-creating for staff {} [{}, {}) without hours or conflict checks",
                req.staff_id, span.start, span.end
            );
            return self.persist(req, span, true, previous.as_ref()).await;
        }

        // ── CheckingAvailability ──
        let (reason, window, conflicts) = match self.check_availability(req.staff_id, span, req.reschedule_of).await? {
            Availability::Available => return self.persist(req, span, false, previous.as_ref()).await,
            Availability::Unavailable { reason, window, conflicts } => (reason, window, conflicts),
        };

        if req.mode == SchedulingMode::Exact {
            match (reason, window) {
                (UnavailableReason::Booked, _) => {}
                (UnavailableReason::OutsideHours, Some(window)) => {
                    return Err(BookingError::OutsideWorkingHours { window });
                }
                _ => return Err(BookingError::ClosedDay { date: span.start.date() }),
            }
        }

        // ── ProposingAlternative ──
        let options = SearchOptions::from_config(&self.config).excluding(req.reschedule_of);
        let slot = self
            .find_next_slot_with(req.staff_id, duration, req.start, options)
            .await?;
        let Some(slot) = slot else {
            return Err(match reason {
                UnavailableReason::Booked => BookingError::Conflict { conflicts },
                UnavailableReason::Closed | UnavailableReason::OutsideHours => BookingError::NoAvailableSlot,
            });
        };

        if req.mode == SchedulingMode::AutoBook {
            return self.persist(req, slot, false, previous.as_ref()).await;
        }

        // ── AwaitingConfirmation ──
        Ok(BookingOutcome::Proposed(Proposal {
            slot,
            reason,
            window,
            conflicts,
        }))
    }

    async fn load_for_reschedule(&self, id: Ulid, staff_id: Ulid) -> Result<Appointment, BookingError> {
        let appointment = self
            .appointments
            .get(id)
            .await?
            .ok_or(BookingError::not_found(EntityKind::Appointment, id))?;
        if appointment.staff_id != staff_id {
            return Err(BookingError::Validation(format!(
                "appointment {id} belongs to another staff member"
            )));
        }
        if !appointment.is_blocking() {
            return Err(BookingError::Validation(format!(
                "appointment {id} is {} and cannot be moved",
                appointment.status.label()
            )));
        }
        Ok(appointment)
    }

    // ── Persisting ──
    async fn persist(
        &self,
        req: &BookingRequest,
        span: Span,
        forced: bool,
        previous: Option<&Appointment>,
    ) -> Result<BookingOutcome, BookingError> {
        let (appointment, event) = match previous {
            Some(prev) => {
                let moved = self.appointments.reschedule(prev.id, span, forced).await?;
                let event = ScheduleEvent::Rescheduled {
                    appointment: moved.clone(),
                    previous: prev.span,
                };
                (moved, event)
            }
            None => {
                let created = self
                    .appointments
                    .create(NewAppointment {
                        staff_id: req.staff_id,
                        customer_id: req.customer_id,
                        service_id: req.service_id,
                        span,
                        status: req.status,
                        notes: req.notes.clone(),
                        forced,
                        idempotency_key: req.idempotency_key.clone(),
                    })
                    .await?;
                let event = ScheduleEvent::Booked {
                    appointment: created.clone(),
                };
                (created, event)
            }
        };

        if let Some(hub) = &self.notify {
            hub.send(appointment.staff_id, &event);
        }
        Ok(BookingOutcome::Booked(appointment))
    }
}
