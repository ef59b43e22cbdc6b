//! PostgreSQL-backed implementation of all three scheduler stores.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AppointmentId, Username, VaccineName};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Appointment, AppointmentLedger, AvailabilityStore, InventoryStore, MAX_DOSES, Result,
    StoreError,
};

/// PostgreSQL store backing availability, inventory, and the ledger over a
/// single connection pool.
///
/// Slot claims and dose decrements are single SQL statements, so each is an
/// atomic read-modify-write on the touched row even without an explicit
/// surrounding transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        tracing::debug!("connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_appointment(row: &PgRow) -> Result<Appointment> {
        Ok(Appointment {
            id: AppointmentId::from_i64(row.try_get("appointment_id")?),
            date: row.try_get("slot_date")?,
            caregiver: Username::new(row.try_get::<String, _>("caregiver")?),
            patient: Username::new(row.try_get::<String, _>("patient")?),
            vaccine: VaccineName::new(row.try_get::<String, _>("vaccine_name")?),
        })
    }

    async fn insert_slot(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        sqlx::query("INSERT INTO availabilities (slot_date, username) VALUES ($1, $2)")
            .bind(date)
            .bind(caregiver.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("availabilities_pkey")
                {
                    return StoreError::DuplicateSlot {
                        caregiver: caregiver.clone(),
                        date,
                    };
                }
                StoreError::Database(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityStore for PostgresStore {
    async fn publish(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        self.insert_slot(caregiver, date).await
    }

    async fn claim_earliest(&self, date: NaiveDate) -> Result<Username> {
        // Single-statement claim: select, lock, and delete the earliest
        // username for the date with no window in between.
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM availabilities a
            USING (
                SELECT slot_date, username
                FROM availabilities
                WHERE slot_date = $1
                ORDER BY username ASC
                LIMIT 1
                FOR UPDATE
            ) picked
            WHERE a.slot_date = picked.slot_date AND a.username = picked.username
            RETURNING a.username
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(username) => {
                tracing::debug!(%date, caregiver = %username, "claimed availability slot");
                Ok(Username::new(username))
            }
            None => Err(StoreError::NoAvailability(date)),
        }
    }

    async fn restore(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        self.insert_slot(caregiver, date).await
    }

    async fn retract(&self, caregiver: &Username, date: NaiveDate) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM availabilities WHERE slot_date = $1 AND username = $2")
                .bind(date)
                .bind(caregiver.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoAvailability(date));
        }
        Ok(())
    }

    async fn available_on(&self, date: NaiveDate) -> Result<Vec<Username>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT username FROM availabilities WHERE slot_date = $1 ORDER BY username ASC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(Username::new).collect())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn doses(&self, vaccine: &VaccineName) -> Result<u32> {
        let count: Option<i32> = sqlx::query_scalar("SELECT doses FROM vaccines WHERE name = $1")
            .bind(vaccine.as_str())
            .fetch_optional(&self.pool)
            .await?;
        count
            .map(|c| c as u32)
            .ok_or_else(|| StoreError::VaccineNotFound(vaccine.clone()))
    }

    async fn add_doses(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        if amount == 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        // Amounts above the cap would truncate to a negative bind value.
        if amount > MAX_DOSES {
            return Err(StoreError::DoseLimitExceeded {
                vaccine: vaccine.clone(),
                limit: MAX_DOSES,
            });
        }
        // The update predicate keeps `doses + amount` within the column
        // range without evaluating the overflowing sum.
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO vaccines (name, doses) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET doses = vaccines.doses + EXCLUDED.doses
            WHERE vaccines.doses <= $3 - EXCLUDED.doses
            RETURNING doses
            "#,
        )
        .bind(vaccine.as_str())
        .bind(amount as i32)
        .bind(MAX_DOSES as i32)
        .fetch_optional(&self.pool)
        .await?;
        count
            .map(|c| c as u32)
            .ok_or_else(|| StoreError::DoseLimitExceeded {
                vaccine: vaccine.clone(),
                limit: MAX_DOSES,
            })
    }

    async fn decrement(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        // Larger than any storable count, and the i32 cast would flip the
        // bind value negative, turning the decrement into an addition.
        if amount > MAX_DOSES {
            let available = self.doses(vaccine).await?;
            return Err(StoreError::InsufficientDoses {
                vaccine: vaccine.clone(),
                requested: amount,
                available,
            });
        }
        // Guarded single-statement decrement; the WHERE clause keeps the
        // count from ever going negative.
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE vaccines SET doses = doses - $2 WHERE name = $1 AND doses >= $2 \
             RETURNING doses",
        )
        .bind(vaccine.as_str())
        .bind(amount as i32)
        .fetch_optional(&self.pool)
        .await?;

        match count {
            Some(c) => Ok(c as u32),
            // No row matched: either the vaccine is unknown or the count is
            // too low. Look again to report the right error.
            None => match self.doses(vaccine).await {
                Ok(available) => Err(StoreError::InsufficientDoses {
                    vaccine: vaccine.clone(),
                    requested: amount,
                    available,
                }),
                Err(e) => Err(e),
            },
        }
    }

    async fn increment(&self, vaccine: &VaccineName, amount: u32) -> Result<u32> {
        if amount > MAX_DOSES {
            return Err(StoreError::DoseLimitExceeded {
                vaccine: vaccine.clone(),
                limit: MAX_DOSES,
            });
        }
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE vaccines SET doses = doses + $2 \
             WHERE name = $1 AND doses <= $3 - $2 RETURNING doses",
        )
        .bind(vaccine.as_str())
        .bind(amount as i32)
        .bind(MAX_DOSES as i32)
        .fetch_optional(&self.pool)
        .await?;

        match count {
            Some(c) => Ok(c as u32),
            // No row matched: unknown vaccine, or the addition would pass
            // the cap. Look again to report the right error.
            None => match self.doses(vaccine).await {
                Ok(_) => Err(StoreError::DoseLimitExceeded {
                    vaccine: vaccine.clone(),
                    limit: MAX_DOSES,
                }),
                Err(e) => Err(e),
            },
        }
    }

    async fn all(&self) -> Result<Vec<(VaccineName, u32)>> {
        let rows = sqlx::query("SELECT name, doses FROM vaccines ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let doses: i32 = row.try_get("doses")?;
                Ok((VaccineName::new(name), doses as u32))
            })
            .collect()
    }
}

#[async_trait]
impl AppointmentLedger for PostgresStore {
    async fn append(
        &self,
        date: NaiveDate,
        caregiver: &Username,
        patient: &Username,
        vaccine: &VaccineName,
    ) -> Result<Appointment> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO appointments (slot_date, caregiver, patient, vaccine_name)
            VALUES ($1, $2, $3, $4)
            RETURNING appointment_id
            "#,
        )
        .bind(date)
        .bind(caregiver.as_str())
        .bind(patient.as_str())
        .bind(vaccine.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(Appointment {
            id: AppointmentId::from_i64(id),
            date,
            caregiver: caregiver.clone(),
            patient: patient.clone(),
            vaccine: vaccine.clone(),
        })
    }

    async fn get(&self, id: AppointmentId) -> Result<Appointment> {
        let row = sqlx::query(
            "SELECT appointment_id, slot_date, caregiver, patient, vaccine_name \
             FROM appointments WHERE appointment_id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_appointment(&row),
            None => Err(StoreError::AppointmentNotFound(id)),
        }
    }

    async fn remove(&self, id: AppointmentId) -> Result<()> {
        let result = sqlx::query("DELETE FROM appointments WHERE appointment_id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AppointmentNotFound(id));
        }
        Ok(())
    }

    async fn for_caregiver(&self, caregiver: &Username) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(
            "SELECT appointment_id, slot_date, caregiver, patient, vaccine_name \
             FROM appointments WHERE caregiver = $1 ORDER BY appointment_id ASC",
        )
        .bind(caregiver.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_appointment).collect()
    }

    async fn for_patient(&self, patient: &Username) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(
            "SELECT appointment_id, slot_date, caregiver, patient, vaccine_name \
             FROM appointments WHERE patient = $1 ORDER BY appointment_id ASC",
        )
        .bind(patient.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_appointment).collect()
    }
}
