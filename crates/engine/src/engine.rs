//! The reservation engine: atomic reserve and cancel over the three stores.

use chrono::NaiveDate;
use common::{AppointmentId, Role, Username, VaccineName};
use serde::{Deserialize, Serialize};
use store::{Appointment, AppointmentLedger, AvailabilityStore, InventoryStore, StoreError};
use tokio::sync::Mutex;

use crate::error::ReservationError;
use crate::session::Session;

/// The result of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// The ledger-assigned appointment id.
    pub appointment_id: AppointmentId,
    /// The caregiver assigned by the earliest-username policy.
    pub caregiver: Username,
}

/// A consistent snapshot of one date's schedule: open caregivers plus the
/// full vaccine inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub caregivers: Vec<Username>,
    pub vaccines: Vec<(VaccineName, u32)>,
}

/// Orchestrates the availability store, inventory store, and appointment
/// ledger to perform `reserve` and `cancel` as atomic, consistent
/// operations.
///
/// Every multi-step sequence runs behind one async mutex, so no concurrent
/// call observes or produces an intermediate state; individual store
/// operations are additionally atomic read-modify-writes in both backends.
/// The engine holds no lock across calls; claiming is immediate and final
/// within one `reserve`.
pub struct ReservationEngine<A, I, L> {
    availability: A,
    inventory: I,
    ledger: L,
    gate: Mutex<()>,
}

impl<A, I, L> ReservationEngine<A, I, L>
where
    A: AvailabilityStore,
    I: InventoryStore,
    L: AppointmentLedger,
{
    /// Creates an engine over the three stores.
    pub fn new(availability: A, inventory: I, ledger: L) -> Self {
        Self {
            availability,
            inventory,
            ledger,
            gate: Mutex::new(()),
        }
    }

    fn require_role(session: &Session, required: Role) -> Result<(), ReservationError> {
        if session.role == required {
            Ok(())
        } else {
            Err(ReservationError::RoleRequired { required })
        }
    }

    /// Books an appointment: claims the earliest-username slot for `date`,
    /// consumes one dose of `vaccine`, and appends to the ledger.
    ///
    /// On a failed dose decrement the claimed slot is restored before the
    /// error is returned; on a failed ledger append both the dose and the
    /// slot are returned. A compensation that cannot complete escalates to
    /// [`ReservationError::ConsistencyFault`].
    #[tracing::instrument(skip(self, session), fields(patient = %session.username))]
    pub async fn reserve(
        &self,
        session: &Session,
        date: NaiveDate,
        vaccine: &VaccineName,
    ) -> Result<Confirmation, ReservationError> {
        Self::require_role(session, Role::Patient)?;
        metrics::counter!("reservations_total").increment(1);
        let started = std::time::Instant::now();

        let _tx = self.gate.lock().await;

        let caregiver = match self.availability.claim_earliest(date).await {
            Ok(caregiver) => caregiver,
            Err(e) => {
                metrics::counter!("reservations_failed_total").increment(1);
                return Err(e.into());
            }
        };

        if let Err(e) = self.inventory.decrement(vaccine, 1).await {
            // Count the failure first: an escalating compensation returns
            // early and must not bypass the counter.
            metrics::counter!("reservations_failed_total").increment(1);
            // The claimed slot must not be lost.
            self.restore_or_fault(&caregiver, date).await?;
            return Err(e.into());
        }

        let appointment = match self
            .ledger
            .append(date, &caregiver, &session.username, vaccine)
            .await
        {
            Ok(appointment) => appointment,
            Err(e) => {
                metrics::counter!("reservations_failed_total").increment(1);
                self.increment_or_fault(vaccine).await?;
                self.restore_or_fault(&caregiver, date).await?;
                return Err(e.into());
            }
        };

        metrics::histogram!("reserve_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            appointment_id = %appointment.id,
            caregiver = %caregiver,
            "appointment reserved"
        );
        Ok(Confirmation {
            appointment_id: appointment.id,
            caregiver,
        })
    }

    /// Cancels an appointment: restores the caregiver's slot, returns the
    /// dose, and removes the ledger record, all-or-nothing.
    ///
    /// The caller must be the patient or the caregiver on the appointment,
    /// in that role: patients and caregivers are separate namespaces, so a
    /// patient whose username happens to match the caregiver's is still a
    /// third party. Cancellation is one-way; the id is never reactivated.
    #[tracing::instrument(skip(self, session), fields(caller = %session.username))]
    pub async fn cancel(
        &self,
        session: &Session,
        id: AppointmentId,
    ) -> Result<(), ReservationError> {
        let _tx = self.gate.lock().await;

        let appointment = self.ledger.get(id).await?;
        let is_party = match session.role {
            Role::Patient => session.username == appointment.patient,
            Role::Caregiver => session.username == appointment.caregiver,
        };
        if !is_party {
            return Err(ReservationError::Unauthorized {
                caller: session.username.clone(),
                appointment: id,
            });
        }

        // First mutation. A duplicate here means invariant 1 is already
        // broken, so abort before touching anything else.
        match self
            .availability
            .restore(&appointment.caregiver, appointment.date)
            .await
        {
            Ok(()) => {}
            Err(StoreError::DuplicateSlot { caregiver, date }) => {
                return Err(ReservationError::ConsistencyFault(format!(
                    "slot for {caregiver} on {date} already open while appointment {id} is active"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.inventory.increment(&appointment.vaccine, 1).await {
            // Take the restored slot back so the failed cancellation leaves
            // no partial effect.
            self.retract_or_fault(&appointment.caregiver, appointment.date)
                .await?;
            return Err(match e {
                StoreError::VaccineNotFound(vaccine) => ReservationError::ConsistencyFault(
                    format!("vaccine {vaccine} vanished while appointment {id} still referenced it"),
                ),
                other => other.into(),
            });
        }

        if let Err(e) = self.ledger.remove(id).await {
            // The record was read under the gate moments ago.
            return Err(ReservationError::ConsistencyFault(format!(
                "appointment {id} could not be removed after its effects were reversed: {e}"
            )));
        }

        metrics::counter!("cancellations_total").increment(1);
        tracing::info!(appointment_id = %id, "appointment cancelled");
        Ok(())
    }

    /// Publishes an open slot for the calling caregiver on `date`.
    #[tracing::instrument(skip(self, session), fields(caregiver = %session.username))]
    pub async fn publish_availability(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<(), ReservationError> {
        Self::require_role(session, Role::Caregiver)?;
        let _tx = self.gate.lock().await;
        self.availability
            .publish(&session.username, date)
            .await
            .map_err(Into::into)
    }

    /// Adds doses to a vaccine, creating it on first use. Returns the new
    /// count.
    #[tracing::instrument(skip(self, session), fields(caregiver = %session.username))]
    pub async fn add_doses(
        &self,
        session: &Session,
        vaccine: &VaccineName,
        amount: u32,
    ) -> Result<u32, ReservationError> {
        Self::require_role(session, Role::Caregiver)?;
        if amount == 0 {
            return Err(ReservationError::InvalidAmount(amount));
        }
        let _tx = self.gate.lock().await;
        self.inventory
            .add_doses(vaccine, amount)
            .await
            .map_err(Into::into)
    }

    /// A consistent snapshot of the schedule for `date`: caregivers with an
    /// open slot plus the full vaccine inventory. Any logged-in role.
    pub async fn schedule_on(
        &self,
        _session: &Session,
        date: NaiveDate,
    ) -> Result<DaySchedule, ReservationError> {
        let _tx = self.gate.lock().await;
        let caregivers = self.availability.available_on(date).await?;
        let vaccines = self.inventory.all().await?;
        Ok(DaySchedule {
            date,
            caregivers,
            vaccines,
        })
    }

    /// The caller's appointments, as provider or recipient depending on
    /// role, sorted by ascending id.
    pub async fn appointments_for(
        &self,
        session: &Session,
    ) -> Result<Vec<Appointment>, ReservationError> {
        let _tx = self.gate.lock().await;
        let appointments = match session.role {
            Role::Caregiver => self.ledger.for_caregiver(&session.username).await?,
            Role::Patient => self.ledger.for_patient(&session.username).await?,
        };
        Ok(appointments)
    }

    /// Restores a claimed slot during compensation, retrying one transient
    /// storage fault before escalating.
    async fn restore_or_fault(
        &self,
        caregiver: &Username,
        date: NaiveDate,
    ) -> Result<(), ReservationError> {
        match self.availability.restore(caregiver, date).await {
            Ok(()) => Ok(()),
            Err(StoreError::Database(first)) => {
                tracing::warn!(error = %first, "slot restore hit a storage fault, retrying");
                self.availability.restore(caregiver, date).await.map_err(|e| {
                    ReservationError::ConsistencyFault(format!(
                        "claimed slot for {caregiver} on {date} could not be restored: {e}"
                    ))
                })
            }
            Err(e) => Err(ReservationError::ConsistencyFault(format!(
                "claimed slot for {caregiver} on {date} could not be restored: {e}"
            ))),
        }
    }

    /// Returns a consumed dose during compensation, with the same
    /// retry-then-escalate policy.
    async fn increment_or_fault(&self, vaccine: &VaccineName) -> Result<(), ReservationError> {
        match self.inventory.increment(vaccine, 1).await {
            Ok(_) => Ok(()),
            Err(StoreError::Database(first)) => {
                tracing::warn!(error = %first, "dose return hit a storage fault, retrying");
                self.inventory.increment(vaccine, 1).await.map(|_| ()).map_err(|e| {
                    ReservationError::ConsistencyFault(format!(
                        "consumed dose of {vaccine} could not be returned: {e}"
                    ))
                })
            }
            Err(e) => Err(ReservationError::ConsistencyFault(format!(
                "consumed dose of {vaccine} could not be returned: {e}"
            ))),
        }
    }

    /// Removes a just-restored slot during compensation of a failed
    /// cancellation.
    async fn retract_or_fault(
        &self,
        caregiver: &Username,
        date: NaiveDate,
    ) -> Result<(), ReservationError> {
        match self.availability.retract(caregiver, date).await {
            Ok(()) => Ok(()),
            Err(StoreError::Database(first)) => {
                tracing::warn!(error = %first, "slot retract hit a storage fault, retrying");
                self.availability.retract(caregiver, date).await.map_err(|e| {
                    ReservationError::ConsistencyFault(format!(
                        "restored slot for {caregiver} on {date} could not be taken back: {e}"
                    ))
                })
            }
            Err(e) => Err(ReservationError::ConsistencyFault(format!(
                "restored slot for {caregiver} on {date} could not be taken back: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{InMemoryAppointmentLedger, InMemoryAvailabilityStore, InMemoryInventoryStore};

    fn engine() -> ReservationEngine<
        InMemoryAvailabilityStore,
        InMemoryInventoryStore,
        InMemoryAppointmentLedger,
    > {
        ReservationEngine::new(
            InMemoryAvailabilityStore::new(),
            InMemoryInventoryStore::new(),
            InMemoryAppointmentLedger::new(),
        )
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn reserve_requires_patient_role() {
        let engine = engine();
        let result = engine
            .reserve(
                &Session::caregiver("alice"),
                date("2024-01-05"),
                &VaccineName::new("Moderna"),
            )
            .await;
        assert!(matches!(
            result,
            Err(ReservationError::RoleRequired {
                required: Role::Patient
            })
        ));
    }

    #[tokio::test]
    async fn publish_and_add_doses_require_caregiver_role() {
        let engine = engine();
        let pat = Session::patient("pat");

        let result = engine.publish_availability(&pat, date("2024-01-05")).await;
        assert!(matches!(
            result,
            Err(ReservationError::RoleRequired {
                required: Role::Caregiver
            })
        ));

        let result = engine.add_doses(&pat, &VaccineName::new("Moderna"), 5).await;
        assert!(matches!(
            result,
            Err(ReservationError::RoleRequired {
                required: Role::Caregiver
            })
        ));
    }

    #[tokio::test]
    async fn add_doses_rejects_zero_amount() {
        let engine = engine();
        let result = engine
            .add_doses(&Session::caregiver("alice"), &VaccineName::new("Moderna"), 0)
            .await;
        assert!(matches!(result, Err(ReservationError::InvalidAmount(0))));
    }
}
