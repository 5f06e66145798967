use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::{BookingError, Engine};

// ── Availability verdict ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Closed,
    OutsideHours,
    Booked,
}

impl UnavailableReason {
    pub fn label(self) -> &'static str {
        match self {
            UnavailableReason::Closed => "closed",
            UnavailableReason::OutsideHours => "outside_hours",
            UnavailableReason::Booked => "booked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable {
        reason: UnavailableReason,
        /// Resolved window, for display. `None` when closed.
        window: Option<WorkingWindow>,
        /// Blocking appointments overlapping the request; empty unless `Booked`.
        conflicts: Vec<Appointment>,
    },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn reason(&self) -> Option<UnavailableReason> {
        match self {
            Availability::Available => None,
            Availability::Unavailable { reason, .. } => Some(*reason),
        }
    }

    fn label(&self) -> &'static str {
        self.reason().map_or("available", UnavailableReason::label)
    }
}

/// Decide whether `span` is bookable given the resolved day and the staff
/// member's appointments around it. Pure: no clock, no I/O.
///
/// `existing` may contain anything; non-blocking statuses, `exclude`, and
/// non-overlapping entries are filtered here.
pub fn check_window(day: WorkingDay, span: Span, existing: &[Appointment], exclude: Option<Ulid>) -> Availability {
    let window = match day {
        WorkingDay::Closed => {
            return Availability::Unavailable {
                reason: UnavailableReason::Closed,
                window: None,
                conflicts: Vec::new(),
            };
        }
        WorkingDay::Open(w) => w,
    };

    // Compared as times of day on the start's date; crossing midnight is always outside.
    let bounds = window.on(span.start.date());
    if !bounds.contains_span(&span) {
        return Availability::Unavailable {
            reason: UnavailableReason::OutsideHours,
            window: Some(window),
            conflicts: Vec::new(),
        };
    }

    let conflicts: Vec<Appointment> = existing
        .iter()
        .filter(|a| a.is_blocking() && Some(a.id) != exclude && a.span.overlaps(&span))
        .cloned()
        .collect();

    if conflicts.is_empty() {
        Availability::Available
    } else {
        Availability::Unavailable {
            reason: UnavailableReason::Booked,
            window: Some(window),
            conflicts,
        }
    }
}

/// Free spans of a working window after subtracting blocking appointments.
pub fn free_spans(window: Span, existing: &[Appointment], exclude: Option<Ulid>) -> Vec<Span> {
    let mut busy: Vec<Span> = existing
        .iter()
        .filter(|a| a.is_blocking() && Some(a.id) != exclude && a.span.overlaps(&window))
        .map(|a| a.span)
        .collect();
    busy.sort_by_key(|s| s.start);
    subtract_intervals(&[window], &merge_overlapping(&busy))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

impl Engine {
    /// Is `span` bookable for `staff_id`? `exclude` skips the appointment being
    /// rescheduled.
    pub async fn check_availability(
        &self,
        staff_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<Availability, BookingError> {
        let day = self.resolve_working_day(staff_id, span.start.date()).await;
        let existing = match day {
            WorkingDay::Closed => Vec::new(),
            WorkingDay::Open(_) => self.appointments.find_overlapping(staff_id, span, exclude).await?,
        };

        let verdict = check_window(day, span, &existing, exclude);
        debug!(
            "availability staff={staff_id} [{}, {}): {}",
            span.start,
            span.end,
            verdict.label()
        );
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "result" => verdict.label())
            .increment(1);
        Ok(verdict)
    }

    /// Free spans of the staff member's working window on `date`.
    pub async fn day_availability(&self, staff_id: Ulid, date: NaiveDate) -> Result<Vec<Span>, BookingError> {
        let window = match self.resolve_working_day(staff_id, date).await {
            WorkingDay::Closed => return Ok(Vec::new()),
            WorkingDay::Open(w) => w.on(date),
        };
        let existing = self.appointments.find_overlapping(staff_id, window, None).await?;
        Ok(free_spans(window, &existing, None))
    }
}
