use chrono::{NaiveDate, TimeDelta, Timelike};
use tracing::debug;
use ulid::Ulid;

use crate::config::SchedulingConfig;
use crate::limits::*;
use crate::model::*;

use super::availability::check_window;
use super::{BookingError, Engine};

/// Knobs of a forward slot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Dates searched after the start date (inclusive range).
    pub horizon_days: u32,
    pub granularity_minutes: u32,
    /// Appointment ignored as a conflict, i.e. the one being moved.
    pub exclude: Option<Ulid>,
}

impl SearchOptions {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            horizon_days: config.search_horizon_days,
            granularity_minutes: config.slot_granularity_minutes,
            exclude: None,
        }
    }

    pub fn excluding(mut self, id: Option<Ulid>) -> Self {
        self.exclude = id;
        self
    }
}

/// Round `t` up to the next multiple of `granularity_minutes` since midnight.
/// May roll over to the next date.
pub fn ceil_to_granularity(t: Instant, granularity_minutes: u32) -> Instant {
    assert!(granularity_minutes > 0, "slot granularity must be positive");
    let step = i64::from(granularity_minutes) * 60;
    let secs = i64::from(t.time().num_seconds_from_midnight());
    let has_fraction = t.time().nanosecond() > 0;
    let mut rounded = (secs + step - 1) / step * step;
    if has_fraction && rounded == secs {
        rounded += step;
    }
    t.date().and_time(chrono::NaiveTime::MIN) + TimeDelta::seconds(rounded)
}

/// First-fit scan of one working window.
///
/// Candidates start at `max(window.start, not_before)` rounded up to the
/// granularity and step by it while the slot still ends inside the window.
/// Returns the first slot the availability check accepts, plus the number of
/// candidates examined.
pub fn first_fit(
    date: NaiveDate,
    window: WorkingWindow,
    not_before: Option<Instant>,
    duration_minutes: u32,
    granularity_minutes: u32,
    existing: &[Appointment],
    exclude: Option<Ulid>,
) -> (Option<Span>, usize) {
    assert!(duration_minutes > 0, "service duration must be positive");
    let bounds = window.on(date);
    let step = TimeDelta::minutes(i64::from(granularity_minutes));
    let length = TimeDelta::minutes(i64::from(duration_minutes));

    let earliest = not_before.map_or(bounds.start, |nb| nb.max(bounds.start));
    let mut t = ceil_to_granularity(earliest, granularity_minutes);
    let mut examined = 0;

    while t + length <= bounds.end {
        examined += 1;
        let candidate = Span::new(t, t + length);
        if check_window(WorkingDay::Open(window), candidate, existing, exclude).is_available() {
            return (Some(candidate), examined);
        }
        t += step;
    }
    (None, examined)
}

/// Every granularity-aligned slot of `duration_minutes` that passes the
/// availability check within one window.
pub fn all_fits(
    date: NaiveDate,
    window: WorkingWindow,
    not_before: Option<Instant>,
    duration_minutes: u32,
    granularity_minutes: u32,
    existing: &[Appointment],
) -> Vec<Span> {
    assert!(duration_minutes > 0, "service duration must be positive");
    let bounds = window.on(date);
    let step = TimeDelta::minutes(i64::from(granularity_minutes));
    let length = TimeDelta::minutes(i64::from(duration_minutes));

    let earliest = not_before.map_or(bounds.start, |nb| nb.max(bounds.start));
    let mut t = ceil_to_granularity(earliest, granularity_minutes);
    let mut slots = Vec::new();
    while t + length <= bounds.end {
        let candidate = Span::new(t, t + length);
        if check_window(WorkingDay::Open(window), candidate, existing, None).is_available() {
            slots.push(candidate);
        }
        t += step;
    }
    slots
}

impl Engine {
    /// Earliest bookable slot of `duration_minutes` at or after `from`, using
    /// the configured horizon and granularity.
    pub async fn find_next_slot(
        &self,
        staff_id: Ulid,
        duration_minutes: u32,
        from: Instant,
    ) -> Result<Option<Span>, BookingError> {
        self.find_next_slot_with(staff_id, duration_minutes, from, SearchOptions::from_config(&self.config))
            .await
    }

    pub async fn find_next_slot_with(
        &self,
        staff_id: Ulid,
        duration_minutes: u32,
        from: Instant,
        options: SearchOptions,
    ) -> Result<Option<Span>, BookingError> {
        let started = std::time::Instant::now();
        let granularity = options
            .granularity_minutes
            .clamp(MIN_GRANULARITY_MINUTES, MAX_GRANULARITY_MINUTES);
        let horizon = options.horizon_days.min(MAX_HORIZON_DAYS);

        // Never offer a slot in the past.
        let now = self.clock.now();
        let from = if from < now { ceil_to_granularity(now, granularity) } else { from };

        let first_date = from.date();
        let mut examined = 0usize;
        let mut found = None;

        for offset in 0..=horizon {
            let Some(date) = first_date.checked_add_days(chrono::Days::new(u64::from(offset))) else {
                break;
            };
            let window = match self.resolve_working_day(staff_id, date).await {
                WorkingDay::Closed => continue,
                WorkingDay::Open(w) => w,
            };
            let not_before = (date == first_date).then_some(from);
            if not_before.is_some_and(|nb| nb >= window.on(date).end) {
                continue;
            }

            let existing = self
                .appointments
                .find_overlapping(staff_id, window.on(date), options.exclude)
                .await?;
            let (slot, n) = first_fit(
                date,
                window,
                not_before,
                duration_minutes,
                granularity,
                &existing,
                options.exclude,
            );
            examined += n;
            if slot.is_some() {
                found = slot;
                break;
            }
        }

        metrics::histogram!(crate::observability::SLOT_SEARCH_CANDIDATES).record(examined as f64);
        metrics::histogram!(crate::observability::SLOT_SEARCH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            crate::observability::SLOT_SEARCHES_TOTAL,
            "result" => if found.is_some() { "found" } else { "not_found" }
        )
        .increment(1);

        match found {
            Some(slot) => debug!(
                "slot search staff={staff_id} from {from}: found [{}, {}) after {examined} candidates",
                slot.start, slot.end
            ),
            None => debug!("slot search staff={staff_id} from {from}: nothing within {horizon} days"),
        }
        Ok(found)
    }

    /// All bookable slots of `duration_minutes` on `date`, earliest first.
    /// Slots already in the past are left out.
    pub async fn list_slots(
        &self,
        staff_id: Ulid,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<Span>, BookingError> {
        let granularity = self.config.slot_granularity_minutes;
        let window = match self.resolve_working_day(staff_id, date).await {
            WorkingDay::Closed => return Ok(Vec::new()),
            WorkingDay::Open(w) => w,
        };
        let now = self.clock.now();
        let not_before = (now.date() >= date).then(|| ceil_to_granularity(now, granularity));
        if not_before.is_some_and(|nb| nb >= window.on(date).end) {
            return Ok(Vec::new());
        }
        let existing = self
            .appointments
            .find_overlapping(staff_id, window.on(date), None)
            .await?;
        Ok(all_fits(date, window, not_before, duration_minutes, granularity, &existing))
    }
}
