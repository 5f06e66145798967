use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Local wall-clock instant of the business. The only instant type.
pub type Instant = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn new(start: Instant, end: Instant) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: Instant, end: Instant) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Span of `minutes` starting at `start`.
    pub fn starting_at(start: Instant, minutes: u32) -> Self {
        Self::new(start, start + TimeDelta::minutes(i64::from(minutes)))
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Working hours ────────────────────────────────────────────────

/// Day-of-week index, 0 = Sunday … 6 = Saturday.
pub type Weekday = u8;

pub fn weekday_of(date: NaiveDate) -> Weekday {
    date.weekday().num_days_from_sunday() as Weekday
}

/// Open window for one calendar date, as times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingWindow {
    /// `None` if `end <= start`; a window never wraps midnight.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Anchor the window on a date.
    pub fn on(&self, date: NaiveDate) -> Span {
        Span::new(date.and_time(self.start), date.and_time(self.end))
    }
}

impl std::fmt::Display for WorkingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Resolved hours of a staff member on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingDay {
    Open(WorkingWindow),
    Closed,
}

impl WorkingDay {
    pub fn window(&self) -> Option<WorkingWindow> {
        match self {
            WorkingDay::Open(w) => Some(*w),
            WorkingDay::Closed => None,
        }
    }
}

/// Hours of a single weekday, either as a staff override or a business default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayHours {
    pub fn open(start: NaiveTime, end: NaiveTime) -> Self {
        Self { enabled: true, start, end }
    }

    /// Enabled and well-formed hours as a window.
    pub fn window(&self) -> Option<WorkingWindow> {
        if self.enabled {
            WorkingWindow::new(self.start, self.end)
        } else {
            None
        }
    }
}

/// Per-weekday hours, indexed by [`Weekday`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyHours {
    pub days: [Option<DayHours>; 7],
}

impl WeeklyHours {
    pub fn get(&self, weekday: Weekday) -> Option<&DayHours> {
        self.days.get(weekday as usize).and_then(|d| d.as_ref())
    }

    pub fn set(&mut self, weekday: Weekday, hours: DayHours) {
        if let Some(slot) = self.days.get_mut(weekday as usize) {
            *slot = Some(hours);
        }
    }

    /// Normalize the keyed-by-day-name shape (`"monday"`, `"Mon"`, …).
    pub fn from_named_days<'a, I>(named: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (&'a str, DayHours)>,
    {
        let mut hours = Self::default();
        for (name, day) in named {
            let weekday = parse_weekday_name(name).ok_or_else(|| format!("unknown day name: {name}"))?;
            hours.set(weekday, day);
        }
        Ok(hours)
    }
}

fn parse_weekday_name(name: &str) -> Option<Weekday> {
    let lower = name.trim().to_ascii_lowercase();
    let idx = match lower.get(..3)? {
        "sun" => 0,
        "mon" => 1,
        "tue" => 2,
        "wed" => 3,
        "thu" => 4,
        "fri" => 5,
        "sat" => 6,
        _ => return None,
    };
    const FULL: [&str; 7] = ["sunday", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday"];
    // Accept any prefix of the full name that is at least three letters long.
    FULL[idx].starts_with(lower.as_str()).then_some(idx as Weekday)
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: Ulid,
    pub name: Option<String>,
    pub working_hours: WeeklyHours,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDay {
    pub weekday: Weekday,
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BusinessDay {
    pub fn window(&self) -> Option<WorkingWindow> {
        if self.enabled {
            WorkingWindow::new(self.start, self.end)
        } else {
            None
        }
    }
}

/// Date-specific override of business and staff hours (holiday, special opening).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleException {
    pub date: NaiveDate,
    pub is_working_day: bool,
    /// Explicit hours for a working exception. `None` falls back to weekly hours.
    pub hours: Option<WorkingWindow>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: Option<String>,
    /// Minutes; `None` or zero means the configured fallback.
    pub duration_minutes: Option<u32>,
    /// Minor currency units.
    pub price: i64,
}

impl Service {
    pub fn effective_duration(&self, fallback_minutes: u32) -> u32 {
        match self.duration_minutes {
            Some(d) if d > 0 => d,
            _ => fallback_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Ulid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    NoShow,
    Cancelled,
}

impl AppointmentStatus {
    /// Only pending and confirmed appointments occupy the staff member's time.
    pub fn is_blocking(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub staff_id: Ulid,
    pub customer_id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    /// Created or moved with force-create; exempt from the overlap guarantee.
    pub forced: bool,
    pub idempotency_key: Option<String>,
}

impl Appointment {
    pub fn is_blocking(&self) -> bool {
        self.status.is_blocking()
    }
}

/// Insert request handed to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub staff_id: Ulid,
    pub customer_id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub forced: bool,
    pub idempotency_key: Option<String>,
}

/// The journal record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StaffUpserted {
        staff: Staff,
    },
    CustomerUpserted {
        customer: Customer,
    },
    ServiceUpserted {
        service: Service,
    },
    BusinessDaySet {
        day: BusinessDay,
    },
    ExceptionSet {
        exception: ScheduleException,
    },
    ExceptionRemoved {
        date: NaiveDate,
    },
    AppointmentCreated {
        appointment: Appointment,
    },
    AppointmentRescheduled {
        id: Ulid,
        staff_id: Ulid,
        span: Span,
        forced: bool,
    },
    AppointmentStatusChanged {
        id: Ulid,
        staff_id: Ulid,
        status: AppointmentStatus,
    },
}
