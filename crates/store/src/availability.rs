//! Availability store: the set of open (caregiver, date) slots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::Username;

use crate::{Result, StoreError};

/// Contract for managing open availability slots.
///
/// A caregiver can hold at most one open slot per date. Claiming is a single
/// atomic select-and-remove; there is no observable window between the read
/// and the delete.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Creates an open slot for the caregiver on the given date.
    ///
    /// Fails with [`StoreError::DuplicateSlot`] if one already exists.
    async fn publish(&self, caregiver: &Username, date: NaiveDate) -> Result<()>;

    /// Atomically removes and returns the slot whose caregiver username
    /// sorts lexicographically smallest for the date.
    ///
    /// The ordering is the caregiver-assignment policy, not an accident:
    /// it spreads bookings deterministically across caregivers.
    /// Fails with [`StoreError::NoAvailability`] if no slot exists.
    async fn claim_earliest(&self, date: NaiveDate) -> Result<Username>;

    /// Re-creates a slot consumed by a reservation that is being cancelled.
    ///
    /// Fails with [`StoreError::DuplicateSlot`] if a slot is unexpectedly
    /// present; callers treat that as a consistency fault.
    async fn restore(&self, caregiver: &Username, date: NaiveDate) -> Result<()>;

    /// Removes a specific open slot (the inverse of [`restore`], used to
    /// back out a compensation).
    ///
    /// Fails with [`StoreError::NoAvailability`] if the slot is not open.
    ///
    /// [`restore`]: AvailabilityStore::restore
    async fn retract(&self, caregiver: &Username, date: NaiveDate) -> Result<()>;

    /// Caregivers with an open slot on the date, sorted ascending by username.
    async fn available_on(&self, date: NaiveDate) -> Result<Vec<Username>>;
}

/// In-memory availability store.
///
/// Slots live in an ordered set per date, so the earliest-username claim is
/// simply the first element.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAvailabilityStore {
    slots: Arc<RwLock<BTreeMap<NaiveDate, BTreeSet<Username>>>>,
}

impl InMemoryAvailabilityStore {
    /// Creates a new empty availability store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of open slots across all dates.
    pub fn slot_count(&self) -> usize {
        self.slots.read().unwrap().values().map(BTreeSet::len).sum()
    }

    fn insert_slot(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        let mut slots = self.slots.write().unwrap();
        let inserted = slots.entry(date).or_default().insert(caregiver.clone());
        if inserted {
            Ok(())
        } else {
            Err(StoreError::DuplicateSlot {
                caregiver: caregiver.clone(),
                date,
            })
        }
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn publish(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        self.insert_slot(caregiver, date)
    }

    async fn claim_earliest(&self, date: NaiveDate) -> Result<Username> {
        let mut slots = self.slots.write().unwrap();
        let Some(for_date) = slots.get_mut(&date) else {
            return Err(StoreError::NoAvailability(date));
        };
        let Some(caregiver) = for_date.pop_first() else {
            return Err(StoreError::NoAvailability(date));
        };
        if for_date.is_empty() {
            slots.remove(&date);
        }
        Ok(caregiver)
    }

    async fn restore(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        self.insert_slot(caregiver, date)
    }

    async fn retract(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        let mut slots = self.slots.write().unwrap();
        let removed = slots
            .get_mut(&date)
            .is_some_and(|for_date| for_date.remove(caregiver));
        if !removed {
            return Err(StoreError::NoAvailability(date));
        }
        if slots.get(&date).is_some_and(BTreeSet::is_empty) {
            slots.remove(&date);
        }
        Ok(())
    }

    async fn available_on(&self, date: NaiveDate) -> Result<Vec<Username>> {
        let slots = self.slots.read().unwrap();
        Ok(slots
            .get(&date)
            .map(|for_date| for_date.iter().cloned().collect())
            .unwrap_or_default())
    }
}
