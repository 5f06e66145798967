use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::ports::*;

/// Map whose entries expire `ttl` after insertion, measured on the injected clock.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        let (value, stored_at) = entry.value();
        if now - *stored_at < self.ttl {
            return Some(value.clone());
        }
        drop(entry);
        self.entries.remove(key);
        None
    }

    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, (value, self.clock.now()));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn record(hit: bool) {
    metrics::counter!(
        crate::observability::HOURS_CACHE_LOOKUPS_TOTAL,
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Caching front for the working-hours collaborators. Absent entries are
/// cached too, so a missing exception costs one lookup per TTL.
pub struct CachedHours {
    staff: Arc<dyn StaffDirectory>,
    calendar: Arc<dyn BusinessCalendar>,
    staff_cache: TtlCache<Ulid, Option<Staff>>,
    business_days: TtlCache<Weekday, Option<BusinessDay>>,
    exceptions: TtlCache<NaiveDate, Option<ScheduleException>>,
}

impl CachedHours {
    pub fn new(
        staff: Arc<dyn StaffDirectory>,
        calendar: Arc<dyn BusinessCalendar>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            staff,
            calendar,
            staff_cache: TtlCache::new(ttl, clock.clone()),
            business_days: TtlCache::new(ttl, clock.clone()),
            exceptions: TtlCache::new(ttl, clock),
        }
    }

    /// Drop a staff member's cached hours after an edit.
    pub fn invalidate_staff(&self, staff_id: Ulid) {
        self.staff_cache.invalidate(&staff_id);
    }

    /// Drop cached business days and exceptions after a calendar edit.
    pub fn invalidate_calendar(&self) {
        self.business_days.clear();
        self.exceptions.clear();
    }
}

#[async_trait]
impl StaffDirectory for CachedHours {
    async fn get_staff(&self, staff_id: Ulid) -> Option<Staff> {
        if let Some(hit) = self.staff_cache.get(&staff_id) {
            record(true);
            return hit;
        }
        record(false);
        let fetched = self.staff.get_staff(staff_id).await;
        self.staff_cache.set(staff_id, fetched.clone());
        fetched
    }
}

#[async_trait]
impl BusinessCalendar for CachedHours {
    async fn get_business_day(&self, weekday: Weekday) -> Option<BusinessDay> {
        if let Some(hit) = self.business_days.get(&weekday) {
            record(true);
            return hit;
        }
        record(false);
        let fetched = self.calendar.get_business_day(weekday).await;
        self.business_days.set(weekday, fetched);
        fetched
    }

    async fn get_exception(&self, date: NaiveDate) -> Option<ScheduleException> {
        if let Some(hit) = self.exceptions.get(&date) {
            record(true);
            return hit;
        }
        record(false);
        let fetched = self.calendar.get_exception(date).await;
        self.exceptions.set(date, fetched.clone());
        fetched
    }
}
