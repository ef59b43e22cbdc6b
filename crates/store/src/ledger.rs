//! Appointment ledger: the authoritative record of confirmed appointments.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AppointmentId, Username, VaccineName};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// A confirmed appointment linking a date, a caregiver, a patient, and a
/// vaccine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Ledger-assigned id, unique and never reused.
    pub id: AppointmentId,
    /// The date of the appointment.
    pub date: NaiveDate,
    /// The caregiver whose slot was consumed.
    pub caregiver: Username,
    /// The patient who booked.
    pub patient: Username,
    /// The vaccine whose dose was consumed.
    pub vaccine: VaccineName,
}

/// Contract for the appointment ledger.
#[async_trait]
pub trait AppointmentLedger: Send + Sync {
    /// Assigns the next id and stores the record, returning it.
    ///
    /// Ids are monotonically increasing and survive removals: a cancelled
    /// appointment's id is never handed out again.
    async fn append(
        &self,
        date: NaiveDate,
        caregiver: &Username,
        patient: &Username,
        vaccine: &VaccineName,
    ) -> Result<Appointment>;

    /// Looks up a record, or [`StoreError::AppointmentNotFound`].
    async fn get(&self, id: AppointmentId) -> Result<Appointment>;

    /// Deletes a record, or [`StoreError::AppointmentNotFound`] if absent.
    async fn remove(&self, id: AppointmentId) -> Result<()>;

    /// The caregiver's appointments, sorted by ascending id.
    async fn for_caregiver(&self, caregiver: &Username) -> Result<Vec<Appointment>>;

    /// The patient's appointments, sorted by ascending id.
    async fn for_patient(&self, patient: &Username) -> Result<Vec<Appointment>>;
}

#[derive(Debug, Default)]
struct LedgerState {
    appointments: BTreeMap<AppointmentId, Appointment>,
    // Monotonic; never reset on removal.
    next_id: i64,
}

/// In-memory appointment ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppointmentLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryAppointmentLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live appointments.
    pub fn len(&self) -> usize {
        self.state.read().unwrap().appointments.len()
    }

    /// Returns true if no appointments are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AppointmentLedger for InMemoryAppointmentLedger {
    async fn append(
        &self,
        date: NaiveDate,
        caregiver: &Username,
        patient: &Username,
        vaccine: &VaccineName,
    ) -> Result<Appointment> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let appointment = Appointment {
            id: AppointmentId::from_i64(state.next_id),
            date,
            caregiver: caregiver.clone(),
            patient: patient.clone(),
            vaccine: vaccine.clone(),
        };
        state
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, id: AppointmentId) -> Result<Appointment> {
        let state = self.state.read().unwrap();
        state
            .appointments
            .get(&id)
            .cloned()
            .ok_or(StoreError::AppointmentNotFound(id))
    }

    async fn remove(&self, id: AppointmentId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state
            .appointments
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::AppointmentNotFound(id))
    }

    async fn for_caregiver(&self, caregiver: &Username) -> Result<Vec<Appointment>> {
        let state = self.state.read().unwrap();
        Ok(state
            .appointments
            .values()
            .filter(|a| &a.caregiver == caregiver)
            .cloned()
            .collect())
    }

    async fn for_patient(&self, patient: &Username) -> Result<Vec<Appointment>> {
        let state = self.state.read().unwrap();
        Ok(state
            .appointments
            .values()
            .filter(|a| &a.patient == patient)
            .cloned()
            .collect())
    }
}
