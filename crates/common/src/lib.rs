//! Shared value objects for the vaccine scheduler.

pub mod types;

pub use types::{AppointmentId, Role, Username, VaccineName};
