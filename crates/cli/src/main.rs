//! Interactive vaccine appointment scheduler.
//!
//! Backed by PostgreSQL when `DATABASE_URL` is set, otherwise by the
//! in-memory stores.

use engine::ReservationEngine;
use store::{
    InMemoryAppointmentLedger, InMemoryAvailabilityStore, InMemoryInventoryStore, PostgresStore,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod accounts;
mod app;
mod command;
mod config;

use accounts::AccountDirectory;
use config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let accounts = AccountDirectory::new();

    match &config.database_url {
        Some(url) => {
            let store = match PostgresStore::connect(url).await {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!(error = %e, "failed to connect to database");
                    std::process::exit(1);
                }
            };
            if let Err(e) = store.run_migrations().await {
                tracing::error!(error = %e, "failed to run migrations");
                std::process::exit(1);
            }
            tracing::info!("using the PostgreSQL-backed stores");

            let engine = ReservationEngine::new(store.clone(), store.clone(), store);
            app::run(engine, accounts).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using the in-memory stores");
            let engine = ReservationEngine::new(
                InMemoryAvailabilityStore::new(),
                InMemoryInventoryStore::new(),
                InMemoryAppointmentLedger::new(),
            );
            app::run(engine, accounts).await;
        }
    }
}
