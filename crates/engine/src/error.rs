//! Engine error taxonomy.

use chrono::NaiveDate;
use common::{AppointmentId, Role, Username, VaccineName};
use store::StoreError;
use thiserror::Error;

/// Errors reported by the reservation engine.
///
/// Every failure is a typed result at the engine boundary; storage faults
/// are wrapped rather than propagated verbatim.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// No caregiver has an open slot on the requested date.
    #[error("no caregiver is available on {0}")]
    NoAvailability(NaiveDate),

    /// The vaccine name is not present in the inventory.
    #[error("unknown vaccine: {0}")]
    VaccineNotFound(VaccineName),

    /// The vaccine exists but has too few doses left.
    #[error("not enough doses of {vaccine}: {available} available")]
    InsufficientDoses {
        vaccine: VaccineName,
        available: u32,
    },

    /// Adding the requested doses would push the count past the storage
    /// cap.
    #[error("dose count for {vaccine} cannot exceed {limit}")]
    DoseLimitExceeded { vaccine: VaccineName, limit: u32 },

    /// An availability slot already exists for this (caregiver, date) pair.
    #[error("availability slot already exists for {caregiver} on {date}")]
    DuplicateSlot {
        caregiver: Username,
        date: NaiveDate,
    },

    /// No appointment exists under this id.
    #[error("appointment not found: {0}")]
    AppointmentNotFound(AppointmentId),

    /// The caller is neither the patient nor the caregiver on the
    /// appointment.
    #[error("{caller} is not a party to appointment {appointment}")]
    Unauthorized {
        caller: Username,
        appointment: AppointmentId,
    },

    /// The operation is gated on a role the caller does not hold.
    #[error("this operation requires the {required} role")]
    RoleRequired { required: Role },

    /// A dose amount must be a positive integer.
    #[error("invalid dose amount: {0} (must be greater than 0)")]
    InvalidAmount(u32),

    /// A storage fault aborted the operation; nothing was applied and the
    /// call is safe to retry.
    #[error("transient storage failure, safe to retry: {0}")]
    TransientFailure(String),

    /// An invariant was found broken mid-operation. This is a bug, not a
    /// user error; the operation aborts instead of continuing.
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),
}

impl From<StoreError> for ReservationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateSlot { caregiver, date } => {
                Self::DuplicateSlot { caregiver, date }
            }
            StoreError::NoAvailability(date) => Self::NoAvailability(date),
            StoreError::VaccineNotFound(vaccine) => Self::VaccineNotFound(vaccine),
            StoreError::InsufficientDoses {
                vaccine, available, ..
            } => Self::InsufficientDoses { vaccine, available },
            StoreError::DoseLimitExceeded { vaccine, limit } => {
                Self::DoseLimitExceeded { vaccine, limit }
            }
            StoreError::AppointmentNotFound(id) => Self::AppointmentNotFound(id),
            StoreError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            StoreError::Database(e) => Self::TransientFailure(e.to_string()),
        }
    }
}
