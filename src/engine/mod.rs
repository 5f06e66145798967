mod availability;
mod booking;
mod error;
mod hours;
mod slots;

pub use availability::{
    Availability, UnavailableReason, check_window, free_spans, merge_overlapping, subtract_intervals,
};
pub use booking::{BookingOutcome, BookingRequest, Proposal, SchedulingMode};
pub use error::{BookingError, EntityKind};
pub use hours::{HoursSource, resolve_working_day};
pub use slots::{SearchOptions, all_fits, ceil_to_granularity, first_fit};

use std::sync::Arc;

use crate::cache::CachedHours;
use crate::config::SchedulingConfig;
use crate::notify::NotifyHub;
use crate::ports::*;
use crate::store::InMemoryStore;

/// The collaborators an engine reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub appointments: Arc<dyn AppointmentRepository>,
    pub staff: Arc<dyn StaffDirectory>,
    pub calendar: Arc<dyn BusinessCalendar>,
    pub services: Arc<dyn ServiceCatalog>,
    pub customers: Arc<dyn CustomerDirectory>,
}

impl Collaborators {
    /// Every collaborator backed by the same store.
    pub fn from_store(store: Arc<InMemoryStore>) -> Self {
        Self {
            appointments: store.clone(),
            staff: store.clone(),
            calendar: store.clone(),
            services: store.clone(),
            customers: store,
        }
    }

    /// Put a TTL cache in front of the staff and calendar lookups.
    pub fn with_hours_cache(mut self, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        let cached = Arc::new(CachedHours::new(self.staff.clone(), self.calendar.clone(), clock, ttl));
        self.staff = cached.clone();
        self.calendar = cached;
        self
    }
}

/// Request-scoped scheduling engine. Holds no mutable state of its own; the
/// only write it performs is the final repository insert or move.
pub struct Engine {
    pub(super) appointments: Arc<dyn AppointmentRepository>,
    pub(super) staff: Arc<dyn StaffDirectory>,
    pub(super) calendar: Arc<dyn BusinessCalendar>,
    pub(super) services: Arc<dyn ServiceCatalog>,
    pub(super) customers: Arc<dyn CustomerDirectory>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: SchedulingConfig,
    pub(super) notify: Option<Arc<NotifyHub>>,
}

impl Engine {
    pub fn new(collaborators: Collaborators, clock: Arc<dyn Clock>, config: SchedulingConfig) -> Self {
        Self {
            appointments: collaborators.appointments,
            staff: collaborators.staff,
            calendar: collaborators.calendar,
            services: collaborators.services,
            customers: collaborators.customers,
            clock,
            config: config.sanitized(),
            notify: None,
        }
    }

    /// Engine over a single in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>, clock: Arc<dyn Clock>, config: SchedulingConfig) -> Self {
        Self::new(Collaborators::from_store(store), clock, config)
    }

    /// Publish a [`crate::notify::ScheduleEvent`] on `hub` after every write.
    pub fn with_notify(mut self, hub: Arc<NotifyHub>) -> Self {
        self.notify = Some(hub);
        self
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }
}
