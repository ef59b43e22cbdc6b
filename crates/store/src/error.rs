use chrono::NaiveDate;
use common::{AppointmentId, Username, VaccineName};
use thiserror::Error;

/// Errors that can occur when interacting with the scheduler stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An availability slot already exists for this (caregiver, date) pair.
    #[error("availability slot already exists for {caregiver} on {date}")]
    DuplicateSlot {
        caregiver: Username,
        date: NaiveDate,
    },

    /// No caregiver has an open slot on the requested date.
    #[error("no caregiver is available on {0}")]
    NoAvailability(NaiveDate),

    /// The vaccine name is not present in the inventory.
    #[error("unknown vaccine: {0}")]
    VaccineNotFound(VaccineName),

    /// The inventory holds fewer doses than requested. The stored count is
    /// left unchanged.
    #[error("not enough doses of {vaccine}: requested {requested}, {available} available")]
    InsufficientDoses {
        vaccine: VaccineName,
        requested: u32,
        available: u32,
    },

    /// Adding the requested doses would push the count past the storage
    /// cap. The stored count is left unchanged.
    #[error("dose count for {vaccine} cannot exceed {limit}")]
    DoseLimitExceeded { vaccine: VaccineName, limit: u32 },

    /// No appointment exists under this id.
    #[error("appointment not found: {0}")]
    AppointmentNotFound(AppointmentId),

    /// A dose amount must be a positive integer.
    #[error("invalid dose amount: {0} (must be greater than 0)")]
    InvalidAmount(u32),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
