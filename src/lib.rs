//! Appointment scheduling core for a service business: working-hours
//! resolution, conflict detection, forward slot search and booking
//! orchestration with an explicit force-create override.

pub mod cache;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod ports;
pub mod store;

pub use config::SchedulingConfig;
pub use engine::{
    Availability, BookingError, BookingOutcome, BookingRequest, Collaborators, Engine, Proposal, SchedulingMode,
    UnavailableReason,
};
pub use store::InMemoryStore;
