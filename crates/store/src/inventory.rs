//! Inventory store: named vaccines and their remaining dose counts.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::VaccineName;

use crate::{Result, StoreError};

/// Largest storable dose count.
///
/// Matches the signed 32-bit `doses` column of the PostgreSQL backend, so
/// every backend enforces the same cap and counts never overflow.
pub const MAX_DOSES: u32 = i32::MAX as u32;

/// Contract for managing vaccine dose inventory.
///
/// Counts are unsigned and every decrement is guarded, so a negative count
/// is unrepresentable: a decrement past zero fails and leaves the count
/// unchanged. Counts are also capped at [`MAX_DOSES`]; an addition that
/// would push past the cap fails with [`StoreError::DoseLimitExceeded`]
/// and leaves the count unchanged.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Current dose count, or [`StoreError::VaccineNotFound`].
    async fn doses(&self, vaccine: &VaccineName) -> Result<u32>;

    /// Creates the vaccine with `amount` doses, or increases an existing
    /// count by `amount`. Returns the new count.
    ///
    /// `amount` must be positive; zero is [`StoreError::InvalidAmount`].
    async fn add_doses(&self, vaccine: &VaccineName, amount: u32) -> Result<u32>;

    /// Atomically reduces the count by `amount`, returning the new count.
    ///
    /// Fails with [`StoreError::InsufficientDoses`] if fewer than `amount`
    /// doses remain, and with [`StoreError::VaccineNotFound`] if the name is
    /// unknown; callers distinguish the two.
    async fn decrement(&self, vaccine: &VaccineName, amount: u32) -> Result<u32>;

    /// Reverses a decrement, returning the new count.
    ///
    /// Fails with [`StoreError::VaccineNotFound`] if the vaccine no longer
    /// exists; callers treat that as a consistency fault.
    async fn increment(&self, vaccine: &VaccineName, amount: u32) -> Result<u32>;

    /// All vaccines and their counts, sorted by name.
    async fn all(&self) -> Result<Vec<(VaccineName, u32)>>;
}

/// In-memory inventory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    counts: Arc<RwLock<BTreeMap<VaccineName, u32>>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty inventory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct vaccines tracked.
    pub fn vaccine_count(&self) -> usize {
        self.counts.read().unwrap().len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn doses(&self, vaccine: &VaccineName) -> Result<u32> {
        let counts = self.counts.read().unwrap();
        counts
            .get(vaccine)
            .copied()
            .ok_or_else(|| StoreError::VaccineNotFound(vaccine.clone()))
    }

    async fn add_doses(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        if amount == 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        let mut counts = self.counts.write().unwrap();
        let current = counts.get(vaccine).copied().unwrap_or(0);
        let updated = current
            .checked_add(amount)
            .filter(|n| *n <= MAX_DOSES)
            .ok_or_else(|| StoreError::DoseLimitExceeded {
                vaccine: vaccine.clone(),
                limit: MAX_DOSES,
            })?;
        counts.insert(vaccine.clone(), updated);
        Ok(updated)
    }

    async fn decrement(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        let mut counts = self.counts.write().unwrap();
        let count = counts
            .get_mut(vaccine)
            .ok_or_else(|| StoreError::VaccineNotFound(vaccine.clone()))?;
        if *count < amount {
            return Err(StoreError::InsufficientDoses {
                vaccine: vaccine.clone(),
                requested: amount,
                available: *count,
            });
        }
        *count -= amount;
        Ok(*count)
    }

    async fn increment(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        let mut counts = self.counts.write().unwrap();
        let count = counts
            .get_mut(vaccine)
            .ok_or_else(|| StoreError::VaccineNotFound(vaccine.clone()))?;
        let updated = count
            .checked_add(amount)
            .filter(|n| *n <= MAX_DOSES)
            .ok_or_else(|| StoreError::DoseLimitExceeded {
                vaccine: vaccine.clone(),
                limit: MAX_DOSES,
            })?;
        *count = updated;
        Ok(updated)
    }

    async fn all(&self) -> Result<Vec<(VaccineName, u32)>> {
        let counts = self.counts.read().unwrap();
        Ok(counts.iter().map(|(n, c)| (n.clone(), *c)).collect())
    }
}
