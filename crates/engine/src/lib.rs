//! The appointment reservation engine.
//!
//! This crate owns the hard core of the scheduler: atomically claiming a
//! caregiver availability slot, decrementing vaccine inventory, and
//! recording the appointment, and reversing all three on cancellation.
//! It orchestrates the three store contracts from the `store` crate and
//! never issues queries of its own.

pub mod engine;
pub mod error;
pub mod session;

pub use engine::{Confirmation, DaySchedule, ReservationEngine};
pub use error::ReservationError;
pub use session::Session;
