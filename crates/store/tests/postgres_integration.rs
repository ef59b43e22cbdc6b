//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use common::{Username, VaccineName};
use sqlx::PgPool;
use store::{
    AppointmentLedger, AvailabilityStore, InventoryStore, MAX_DOSES, PostgresStore, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for the schema
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_scheduler_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE vaccines, availabilities, appointments")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn moderna() -> VaccineName {
    VaccineName::new("Moderna")
}

#[tokio::test]
async fn publish_enforces_one_slot_per_pair() {
    let store = get_test_store().await;
    let alice = Username::new("alice");
    let d = date("2024-01-05");

    store.publish(&alice, d).await.unwrap();
    let result = store.publish(&alice, d).await;
    assert!(matches!(result, Err(StoreError::DuplicateSlot { .. })));

    // A different date is fine.
    store.publish(&alice, date("2024-01-06")).await.unwrap();
}

#[tokio::test]
async fn claim_is_atomic_and_ordered_by_username() {
    let store = get_test_store().await;
    let d = date("2024-01-05");
    for name in ["bob", "alice", "carl"] {
        store.publish(&Username::new(name), d).await.unwrap();
    }

    assert_eq!(store.claim_earliest(d).await.unwrap().as_str(), "alice");
    assert_eq!(store.claim_earliest(d).await.unwrap().as_str(), "bob");
    assert_eq!(store.claim_earliest(d).await.unwrap().as_str(), "carl");

    let result = store.claim_earliest(d).await;
    assert!(matches!(result, Err(StoreError::NoAvailability(_))));
}

#[tokio::test]
async fn concurrent_claims_never_hand_out_the_same_slot() {
    let store = get_test_store().await;
    let d = date("2024-01-05");
    for name in ["alice", "bob", "carl"] {
        store.publish(&Username::new(name), d).await.unwrap();
    }

    // Fire more claims than slots from independent tasks over the pool.
    let mut handles = Vec::new();
    for _ in 0..6 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.claim_earliest(d).await }));
    }

    let mut claimed = Vec::new();
    let mut misses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(caregiver) => claimed.push(caregiver),
            Err(StoreError::NoAvailability(_)) => misses += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), 3);
    assert_eq!(misses, 3);
}

#[tokio::test]
async fn restore_and_retract_roundtrip() {
    let store = get_test_store().await;
    let d = date("2024-01-05");
    let alice = Username::new("alice");
    store.publish(&alice, d).await.unwrap();

    let claimed = store.claim_earliest(d).await.unwrap();
    store.restore(&claimed, d).await.unwrap();
    assert_eq!(store.available_on(d).await.unwrap(), vec![alice.clone()]);

    store.retract(&alice, d).await.unwrap();
    assert!(store.available_on(d).await.unwrap().is_empty());

    let result = store.retract(&alice, d).await;
    assert!(matches!(result, Err(StoreError::NoAvailability(_))));
}

#[tokio::test]
async fn add_doses_creates_then_increases() {
    let store = get_test_store().await;

    assert_eq!(store.add_doses(&moderna(), 10).await.unwrap(), 10);
    assert_eq!(store.add_doses(&moderna(), 5).await.unwrap(), 15);
    assert_eq!(store.doses(&moderna()).await.unwrap(), 15);

    let result = store.add_doses(&moderna(), 0).await;
    assert!(matches!(result, Err(StoreError::InvalidAmount(0))));
}

#[tokio::test]
async fn decrement_is_guarded_and_errors_are_distinct() {
    let store = get_test_store().await;
    store.add_doses(&moderna(), 2).await.unwrap();

    assert_eq!(store.decrement(&moderna(), 1).await.unwrap(), 1);

    let result = store.decrement(&moderna(), 2).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientDoses {
            requested: 2,
            available: 1,
            ..
        })
    ));
    assert_eq!(store.doses(&moderna()).await.unwrap(), 1);

    let result = store.decrement(&VaccineName::new("Pfizer"), 1).await;
    assert!(matches!(result, Err(StoreError::VaccineNotFound(_))));
}

#[tokio::test]
async fn dose_counts_are_capped_at_the_column_limit() {
    let store = get_test_store().await;
    store.add_doses(&moderna(), MAX_DOSES).await.unwrap();

    let result = store.add_doses(&moderna(), 1).await;
    assert!(matches!(result, Err(StoreError::DoseLimitExceeded { .. })));
    assert_eq!(store.doses(&moderna()).await.unwrap(), MAX_DOSES);

    store.decrement(&moderna(), 1).await.unwrap();
    let result = store.increment(&moderna(), 2).await;
    assert!(matches!(result, Err(StoreError::DoseLimitExceeded { .. })));
    assert_eq!(store.doses(&moderna()).await.unwrap(), MAX_DOSES - 1);

    // Amounts past the cap are rejected before they reach a bind value.
    let result = store.add_doses(&VaccineName::new("Pfizer"), u32::MAX).await;
    assert!(matches!(result, Err(StoreError::DoseLimitExceeded { .. })));

    // An oversized decrement is an insufficiency, never an addition.
    let result = store.decrement(&moderna(), u32::MAX).await;
    assert!(matches!(result, Err(StoreError::InsufficientDoses { .. })));
    assert_eq!(store.doses(&moderna()).await.unwrap(), MAX_DOSES - 1);
}

#[tokio::test]
async fn increment_requires_an_existing_vaccine() {
    let store = get_test_store().await;
    store.add_doses(&moderna(), 1).await.unwrap();
    store.decrement(&moderna(), 1).await.unwrap();

    assert_eq!(store.increment(&moderna(), 1).await.unwrap(), 1);

    let result = store.increment(&VaccineName::new("Pfizer"), 1).await;
    assert!(matches!(result, Err(StoreError::VaccineNotFound(_))));
}

#[tokio::test]
async fn ledger_ids_are_monotonic_and_never_reused() {
    let store = get_test_store().await;
    let alice = Username::new("alice");
    let pat = Username::new("pat");
    let d = date("2024-01-05");

    let first = store.append(d, &alice, &pat, &moderna()).await.unwrap();
    store.remove(first.id).await.unwrap();
    let second = store.append(d, &alice, &pat, &moderna()).await.unwrap();

    assert!(second.id > first.id);
    assert!(matches!(
        store.get(first.id).await,
        Err(StoreError::AppointmentNotFound(_))
    ));
    assert!(matches!(
        store.remove(first.id).await,
        Err(StoreError::AppointmentNotFound(_))
    ));
}

#[tokio::test]
async fn ledger_listings_filter_by_party_and_sort_by_id() {
    let store = get_test_store().await;
    let d = date("2024-01-05");
    let alice = Username::new("alice");
    let bob = Username::new("bob");
    let pat = Username::new("pat");
    let quinn = Username::new("quinn");

    store.append(d, &alice, &pat, &moderna()).await.unwrap();
    store.append(d, &bob, &pat, &moderna()).await.unwrap();
    store.append(d, &alice, &quinn, &moderna()).await.unwrap();

    let pats = store.for_patient(&pat).await.unwrap();
    assert_eq!(pats.len(), 2);
    assert!(pats[0].id < pats[1].id);

    let alices = store.for_caregiver(&alice).await.unwrap();
    assert_eq!(alices.len(), 2);
    assert_eq!(
        alices.iter().map(|a| a.patient.as_str()).collect::<Vec<_>>(),
        vec!["pat", "quinn"]
    );
}

#[tokio::test]
async fn inventory_listing_is_sorted_by_name() {
    let store = get_test_store().await;
    store.add_doses(&VaccineName::new("Pfizer"), 4).await.unwrap();
    store.add_doses(&moderna(), 9).await.unwrap();

    let all = store.all().await.unwrap();
    assert_eq!(
        all,
        vec![(moderna(), 9), (VaccineName::new("Pfizer"), 4)]
    );
}
