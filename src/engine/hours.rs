use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::Engine;

/// Which layer decided a [`WorkingDay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoursSource {
    /// Unknown or inactive staff member.
    Staff,
    Exception,
    StaffOverride,
    Business,
    /// Nothing configured for the weekday.
    Fallback,
}

/// Resolve the working day of one staff member.
///
/// Precedence, first match wins:
/// 1. a date exception: closed, or open with its own hours, or open without
///    hours (falls through to the weekly layers)
/// 2. an enabled staff override for the weekday
/// 3. the business default for the weekday
/// 4. closed
///
/// Absent or malformed data resolves to `Closed`, never to open.
pub fn resolve_working_day(
    date: NaiveDate,
    staff: Option<&Staff>,
    exception: Option<&ScheduleException>,
    business_day: Option<&BusinessDay>,
) -> (WorkingDay, HoursSource) {
    let staff = match staff {
        Some(s) if s.active => s,
        _ => return (WorkingDay::Closed, HoursSource::Staff),
    };

    if let Some(ex) = exception {
        if !ex.is_working_day {
            return (WorkingDay::Closed, HoursSource::Exception);
        }
        if let Some(hours) = ex.hours {
            return match WorkingWindow::new(hours.start, hours.end) {
                Some(w) => (WorkingDay::Open(w), HoursSource::Exception),
                None => (WorkingDay::Closed, HoursSource::Exception),
            };
        }
    }

    let weekday = weekday_of(date);

    if let Some(over) = staff.working_hours.get(weekday)
        && over.enabled
    {
        return match over.window() {
            Some(w) => (WorkingDay::Open(w), HoursSource::StaffOverride),
            None => (WorkingDay::Closed, HoursSource::StaffOverride),
        };
    }

    match business_day.filter(|b| b.weekday == weekday) {
        Some(b) => match b.window() {
            Some(w) => (WorkingDay::Open(w), HoursSource::Business),
            None => (WorkingDay::Closed, HoursSource::Business),
        },
        None => (WorkingDay::Closed, HoursSource::Fallback),
    }
}

impl Engine {
    /// Effective working window of a staff member on `date`.
    pub async fn resolve_working_day(&self, staff_id: Ulid, date: NaiveDate) -> WorkingDay {
        let staff = self.staff.get_staff(staff_id).await;
        let exception = self.calendar.get_exception(date).await;
        let business_day = self.calendar.get_business_day(weekday_of(date)).await;

        let (day, source) = resolve_working_day(date, staff.as_ref(), exception.as_ref(), business_day.as_ref());
        debug!("hours for staff {staff_id} on {date}: {day:?} (from {source:?})");
        day
    }
}
