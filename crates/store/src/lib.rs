//! Storage layer for the vaccine scheduler.
//!
//! This crate defines the three store contracts the reservation engine
//! orchestrates:
//! - [`AvailabilityStore`] — open (caregiver, date) slots
//! - [`InventoryStore`] — named vaccines and their remaining dose counts
//! - [`AppointmentLedger`] — confirmed appointments under unique ids
//!
//! Each contract has an in-memory backend (tests, demo runs) and a
//! PostgreSQL backend ([`PostgresStore`]) that implements all three traits
//! over a single connection pool. Slot claims and dose decrements are atomic
//! read-modify-writes in both backends.

pub mod availability;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod postgres;

pub use availability::{AvailabilityStore, InMemoryAvailabilityStore};
pub use error::{Result, StoreError};
pub use inventory::{InMemoryInventoryStore, InventoryStore, MAX_DOSES};
pub use ledger::{Appointment, AppointmentLedger, InMemoryAppointmentLedger};
pub use postgres::PostgresStore;
