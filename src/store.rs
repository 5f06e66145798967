use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::ports::*;
use crate::journal::Journal;

pub type SharedSchedule = Arc<RwLock<StaffSchedule>>;

/// One staff member's appointments, sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct StaffSchedule {
    pub appointments: Vec<Appointment>,
}

impl StaffSchedule {
    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Appointments whose span overlaps the query.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self.appointments.partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    /// Blocking appointments overlapping `span`, other than `exclude`.
    pub fn blocking_conflicts(&self, span: &Span, exclude: Option<Ulid>) -> Vec<Appointment> {
        self.overlapping(span)
            .filter(|a| a.is_blocking() && Some(a.id) != exclude)
            .cloned()
            .collect()
    }
}

/// Apply an appointment event to the owning schedule (caller holds the lock).
fn apply_to_schedule(schedule: &mut StaffSchedule, event: &Event) {
    match event {
        Event::AppointmentCreated { appointment } => schedule.insert(appointment.clone()),
        Event::AppointmentRescheduled { id, span, forced, .. } => {
            if let Some(mut moved) = schedule.remove(*id) {
                moved.span = *span;
                moved.forced = *forced;
                schedule.insert(moved);
            }
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some(a) = schedule.appointments.iter_mut().find(|a| a.id == *id) {
                a.status = *status;
            }
        }
        _ => {}
    }
}

fn check_span(span: &Span) -> Result<(), RepositoryError> {
    match Span::try_new(span.start, span.end) {
        Some(_) => Ok(()),
        None => Err(RepositoryError::Invalid(format!("span [{}, {}) is empty", span.start, span.end))),
    }
}

/// Replay skips appointment events whose span could never have been written.
fn spans_well_formed(event: &Event) -> bool {
    match event {
        Event::AppointmentCreated { appointment } => check_span(&appointment.span).is_ok(),
        Event::AppointmentRescheduled { span, .. } => check_span(span).is_ok(),
        _ => true,
    }
}

enum KeyLookup {
    Fresh,
    Replay(Appointment),
    Elsewhere(Ulid),
}

/// Reference implementation of every collaborator, optionally journaled to disk.
pub struct InMemoryStore {
    staff: DashMap<Ulid, Staff>,
    customers: DashMap<Ulid, Customer>,
    services: DashMap<Ulid, Service>,
    business_days: DashMap<Weekday, BusinessDay>,
    exceptions: DashMap<NaiveDate, ScheduleException>,
    schedules: DashMap<Ulid, SharedSchedule>,
    /// Reverse lookup: appointment id → staff id
    appointment_to_staff: DashMap<Ulid, Ulid>,
    /// Idempotency key → appointment id
    keys: DashMap<String, Ulid>,
    /// Held shared by every write, exclusively by `compact`.
    gate: RwLock<()>,
    journal: Option<Mutex<Journal>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Volatile store; nothing survives the process.
    pub fn new() -> Self {
        Self {
            staff: DashMap::new(),
            customers: DashMap::new(),
            services: DashMap::new(),
            business_days: DashMap::new(),
            exceptions: DashMap::new(),
            schedules: DashMap::new(),
            appointment_to_staff: DashMap::new(),
            keys: DashMap::new(),
            gate: RwLock::new(()),
            journal: None,
        }
    }

    /// Replay the journal at `path` and keep appending to it.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let events = Journal::replay(path)?;
        let mut store = Self::new();

        // Sole owner during replay: build plain schedules, wrap them at the end.
        let mut schedules: HashMap<Ulid, StaffSchedule> = HashMap::new();
        for event in &events {
            if !spans_well_formed(event) {
                warn!("journal {}: skipping {event:?} with an inverted span", path.display());
                continue;
            }
            match event {
                Event::AppointmentCreated { appointment } => {
                    let schedule = schedules.entry(appointment.staff_id).or_default();
                    apply_to_schedule(schedule, event);
                    store.index(event);
                }
                Event::AppointmentRescheduled { staff_id, .. }
                | Event::AppointmentStatusChanged { staff_id, .. } => {
                    if let Some(schedule) = schedules.get_mut(staff_id) {
                        apply_to_schedule(schedule, event);
                    }
                }
                other => store.apply_catalog(other),
            }
        }
        for (staff_id, schedule) in schedules {
            store.schedules.insert(staff_id, Arc::new(RwLock::new(schedule)));
        }

        store.journal = Some(Mutex::new(Journal::open(path)?));
        info!("journal {} replayed: {} events", path.display(), events.len());
        Ok(store)
    }

    /// Append to the journal, if any. Called before the event is applied.
    async fn record(&self, event: &Event) -> Result<(), RepositoryError> {
        let Some(journal) = &self.journal else { return Ok(()) };
        journal
            .lock()
            .await
            .append(event)
            .map_err(|e| RepositoryError::Backend(format!("journal append failed: {e}")))?;
        metrics::counter!(crate::observability::JOURNAL_APPENDS_TOTAL).increment(1);
        Ok(())
    }

    fn apply_catalog(&self, event: &Event) {
        match event {
            Event::StaffUpserted { staff } => {
                self.staff.insert(staff.id, staff.clone());
            }
            Event::CustomerUpserted { customer } => {
                self.customers.insert(customer.id, customer.clone());
            }
            Event::ServiceUpserted { service } => {
                self.services.insert(service.id, service.clone());
            }
            Event::BusinessDaySet { day } => {
                self.business_days.insert(day.weekday, *day);
            }
            Event::ExceptionSet { exception } => {
                self.exceptions.insert(exception.date, exception.clone());
            }
            Event::ExceptionRemoved { date } => {
                self.exceptions.remove(date);
            }
            Event::AppointmentCreated { .. }
            | Event::AppointmentRescheduled { .. }
            | Event::AppointmentStatusChanged { .. } => {}
        }
    }

    fn index(&self, event: &Event) {
        if let Event::AppointmentCreated { appointment } = event {
            self.appointment_to_staff.insert(appointment.id, appointment.staff_id);
            if let Some(key) = &appointment.idempotency_key {
                self.keys.insert(key.clone(), appointment.id);
            }
        }
    }

    async fn write_catalog(&self, event: Event) -> Result<(), RepositoryError> {
        let _gate = self.gate.read().await;
        self.record(&event).await?;
        self.apply_catalog(&event);
        Ok(())
    }

    fn schedule(&self, staff_id: Ulid) -> SharedSchedule {
        self.schedules.entry(staff_id).or_default().value().clone()
    }

    fn check_name(name: &Option<String>) -> Result<(), RepositoryError> {
        if name.as_ref().is_some_and(|n| n.len() > MAX_NAME_LEN) {
            return Err(RepositoryError::Invalid("name too long".into()));
        }
        Ok(())
    }

    // ── Catalog writes ───────────────────────────────────────

    pub async fn upsert_staff(&self, staff: Staff) -> Result<(), RepositoryError> {
        Self::check_name(&staff.name)?;
        self.write_catalog(Event::StaffUpserted { staff }).await
    }

    pub async fn upsert_customer(&self, customer: Customer) -> Result<(), RepositoryError> {
        Self::check_name(&customer.name)?;
        self.write_catalog(Event::CustomerUpserted { customer }).await
    }

    pub async fn upsert_service(&self, service: Service) -> Result<(), RepositoryError> {
        Self::check_name(&service.name)?;
        if service.duration_minutes.is_some_and(|d| d > MAX_SERVICE_DURATION_MINUTES) {
            return Err(RepositoryError::Invalid("service duration too long".into()));
        }
        self.write_catalog(Event::ServiceUpserted { service }).await
    }

    pub async fn set_business_day(&self, day: BusinessDay) -> Result<(), RepositoryError> {
        if day.weekday > 6 {
            return Err(RepositoryError::Invalid(format!("weekday {} out of range", day.weekday)));
        }
        self.write_catalog(Event::BusinessDaySet { day }).await
    }

    pub async fn set_exception(&self, exception: ScheduleException) -> Result<(), RepositoryError> {
        if exception.reason.as_ref().is_some_and(|r| r.len() > MAX_REASON_LEN) {
            return Err(RepositoryError::Invalid("exception reason too long".into()));
        }
        self.write_catalog(Event::ExceptionSet { exception }).await
    }

    pub async fn remove_exception(&self, date: NaiveDate) -> Result<(), RepositoryError> {
        self.write_catalog(Event::ExceptionRemoved { date }).await
    }

    // ── Appointment reads and status changes ─────────────────

    /// All appointments of a staff member, sorted by start.
    pub async fn appointments_for(&self, staff_id: Ulid) -> Vec<Appointment> {
        match self.schedules.get(&staff_id).map(|e| e.value().clone()) {
            Some(schedule) => schedule.read().await.appointments.clone(),
            None => Vec::new(),
        }
    }

    /// Attendance marking and cancellation. Only consumed as a filter by the engine.
    pub async fn set_status(&self, id: Ulid, status: AppointmentStatus) -> Result<Appointment, RepositoryError> {
        let staff_id = self
            .appointment_to_staff
            .get(&id)
            .map(|e| *e.value())
            .ok_or(RepositoryError::NotFound(id))?;
        let _gate = self.gate.read().await;
        let schedule = self.schedule(staff_id);
        let mut guard = schedule.write().await;
        let current = guard.get(id).ok_or(RepositoryError::NotFound(id))?;

        // Reviving a cancelled or no-show appointment must not land on a newer booking.
        if status.is_blocking() && !current.is_blocking() && !current.forced {
            let conflicts = guard.blocking_conflicts(&current.span, Some(id));
            if !conflicts.is_empty() {
                return Err(RepositoryError::Conflict(conflicts));
            }
        }

        let event = Event::AppointmentStatusChanged { id, staff_id, status };
        self.record(&event).await?;
        apply_to_schedule(&mut guard, &event);
        debug!("appointment {id} is now {}", status.label());
        guard.get(id).cloned().ok_or(RepositoryError::NotFound(id))
    }

    /// Rewrite the journal from current state.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let Some(journal) = &self.journal else { return Ok(()) };
        // No write may land between the snapshot and the swap.
        let _gate = self.gate.write().await;

        let mut events: Vec<Event> = Vec::new();
        events.extend(self.staff.iter().map(|e| Event::StaffUpserted { staff: e.value().clone() }));
        events.extend(
            self.customers
                .iter()
                .map(|e| Event::CustomerUpserted { customer: e.value().clone() }),
        );
        events.extend(
            self.services
                .iter()
                .map(|e| Event::ServiceUpserted { service: e.value().clone() }),
        );
        events.extend(self.business_days.iter().map(|e| Event::BusinessDaySet { day: *e.value() }));
        events.extend(
            self.exceptions
                .iter()
                .map(|e| Event::ExceptionSet { exception: e.value().clone() }),
        );

        let schedules: Vec<SharedSchedule> = self.schedules.iter().map(|e| e.value().clone()).collect();
        for schedule in schedules {
            let guard = schedule.read().await;
            events.extend(
                guard
                    .appointments
                    .iter()
                    .map(|a| Event::AppointmentCreated { appointment: a.clone() }),
            );
        }

        let mut journal = journal.lock().await;
        let before = journal.appends_since_compact();
        journal
            .compact(&events)
            .map_err(|e| RepositoryError::Backend(format!("journal compaction failed: {e}")))?;
        info!("journal compacted: {before} appends folded into {} events", events.len());
        Ok(())
    }

    /// Appends since the last compaction; zero without a journal.
    pub async fn journal_appends(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.lock().await.appends_since_compact(),
            None => 0,
        }
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryStore {
    async fn find_overlapping(
        &self,
        staff_id: Ulid,
        span: Span,
        exclude_id: Option<Ulid>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let Some(schedule) = self.schedules.get(&staff_id).map(|e| e.value().clone()) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard
            .overlapping(&span)
            .filter(|a| Some(a.id) != exclude_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, RepositoryError> {
        let Some(staff_id) = self.appointment_to_staff.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let schedule = self.schedule(staff_id);
        let guard = schedule.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn create(&self, new: NewAppointment) -> Result<Appointment, RepositoryError> {
        check_span(&new.span)?;
        if new.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(RepositoryError::Invalid("notes too long".into()));
        }
        if new.idempotency_key.as_ref().is_some_and(|k| k.len() > MAX_IDEMPOTENCY_KEY_LEN) {
            return Err(RepositoryError::Invalid("idempotency key too long".into()));
        }

        let _gate = self.gate.read().await;
        let schedule = self.schedule(new.staff_id);
        let mut guard = schedule.write().await;

        let lookup = match new.idempotency_key.as_ref().and_then(|k| self.keys.get(k).map(|e| *e.value())) {
            None => KeyLookup::Fresh,
            Some(id) => match guard.get(id) {
                Some(existing) => KeyLookup::Replay(existing.clone()),
                None => KeyLookup::Elsewhere(id),
            },
        };
        match lookup {
            KeyLookup::Fresh => {}
            KeyLookup::Replay(existing) => {
                debug!("idempotent replay of appointment {}", existing.id);
                return Ok(existing);
            }
            KeyLookup::Elsewhere(id) => {
                debug!("idempotency key of appointment {id} reused for staff {}", new.staff_id);
                return Err(RepositoryError::Invalid(
                    "idempotency key reused for a different request".into(),
                ));
            }
        }

        // Overlap guarantee, checked under the same lock as the insert.
        if !new.forced {
            let conflicts = guard.blocking_conflicts(&new.span, None);
            if !conflicts.is_empty() {
                return Err(RepositoryError::Conflict(conflicts));
            }
        }

        let appointment = Appointment {
            id: Ulid::new(),
            staff_id: new.staff_id,
            customer_id: new.customer_id,
            service_id: new.service_id,
            span: new.span,
            status: new.status,
            notes: new.notes,
            forced: new.forced,
            idempotency_key: new.idempotency_key,
        };
        let event = Event::AppointmentCreated {
            appointment: appointment.clone(),
        };
        self.record(&event).await?;
        apply_to_schedule(&mut guard, &event);
        self.index(&event);
        Ok(appointment)
    }

    async fn reschedule(&self, id: Ulid, span: Span, forced: bool) -> Result<Appointment, RepositoryError> {
        check_span(&span)?;
        let staff_id = self
            .appointment_to_staff
            .get(&id)
            .map(|e| *e.value())
            .ok_or(RepositoryError::NotFound(id))?;
        let _gate = self.gate.read().await;
        let schedule = self.schedule(staff_id);
        let mut guard = schedule.write().await;
        if guard.get(id).is_none() {
            return Err(RepositoryError::NotFound(id));
        }

        if !forced {
            let conflicts = guard.blocking_conflicts(&span, Some(id));
            if !conflicts.is_empty() {
                return Err(RepositoryError::Conflict(conflicts));
            }
        }

        let event = Event::AppointmentRescheduled { id, staff_id, span, forced };
        self.record(&event).await?;
        apply_to_schedule(&mut guard, &event);
        guard.get(id).cloned().ok_or(RepositoryError::NotFound(id))
    }
}

#[async_trait]
impl StaffDirectory for InMemoryStore {
    async fn get_staff(&self, staff_id: Ulid) -> Option<Staff> {
        self.staff.get(&staff_id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl BusinessCalendar for InMemoryStore {
    async fn get_business_day(&self, weekday: Weekday) -> Option<BusinessDay> {
        self.business_days.get(&weekday).map(|e| *e.value())
    }

    async fn get_exception(&self, date: NaiveDate) -> Option<ScheduleException> {
        self.exceptions.get(&date).map(|e| e.value().clone())
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryStore {
    async fn get_service(&self, service_id: Ulid) -> Option<Service> {
        self.services.get(&service_id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryStore {
    async fn exists(&self, customer_id: Ulid) -> bool {
        self.customers.contains_key(&customer_id)
    }
}
