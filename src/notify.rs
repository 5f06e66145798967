use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Appointment, Span};

const CHANNEL_CAPACITY: usize = 256;

/// Published after a successful write so open views can refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    Booked { appointment: Appointment },
    Rescheduled { appointment: Appointment, previous: Span },
}

impl ScheduleEvent {
    pub fn appointment(&self) -> &Appointment {
        match self {
            ScheduleEvent::Booked { appointment } | ScheduleEvent::Rescheduled { appointment, .. } => appointment,
        }
    }
}

/// Per-staff broadcast hub. Owned by the engine's caller and attached with
/// [`crate::engine::Engine::with_notify`].
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<ScheduleEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a staff member's schedule. Creates the channel if needed.
    pub fn subscribe(&self, staff_id: Ulid) -> broadcast::Receiver<ScheduleEvent> {
        let sender = self
            .channels
            .entry(staff_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, staff_id: Ulid, event: &ScheduleEvent) {
        if let Some(sender) = self.channels.get(&staff_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a staff member's channel; open receivers see it close.
    pub fn remove(&self, staff_id: &Ulid) {
        self.channels.remove(staff_id);
    }
}
