//! Persistence for the booking platform.
//!
//! Two backends implement the repository traits from `trailhead-core`:
//! Postgres (plus Redis for workflow history and scheduler leases) and an
//! in-memory backend used by tests and local runs. [`Stores`] bundles
//! whichever one the configuration selects.

pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod ticket_repo;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use trailhead_core::coordination::{ExecutionHistory, LeaseStore};
use trailhead_core::repository::{BookingRepository, PoiRepository, StoreHealth, TicketRepository};
use trailhead_shared::Poi;

pub use app_config::Config;
pub use booking_repo::StoreBookingRepository;
pub use catalog_repo::StorePoiRepository;
pub use database::DbClient;
pub use redis_repo::{RedisClient, RedisExecutionHistory, RedisLeaseStore};
pub use ticket_repo::StoreTicketRepository;

use app_config::{StorageBackend, WorkflowConfig};
use memory::{
    MemoryBookingRepository, MemoryExecutionHistory, MemoryHealth, MemoryLeaseStore,
    MemoryPoiRepository, MemoryTicketRepository,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Seed file {path}: {message}")]
    Seed { path: String, message: String },
}

/// Every repository the services need, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub pois: Arc<dyn PoiRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub history: Arc<dyn ExecutionHistory>,
    pub leases: Arc<dyn LeaseStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    pub fn memory(workflows: &WorkflowConfig) -> Self {
        Self::memory_with_pois(workflows, Vec::new())
    }

    pub fn memory_with_pois(workflows: &WorkflowConfig, pois: Vec<Poi>) -> Self {
        Self {
            pois: Arc::new(MemoryPoiRepository::with_pois(pois)),
            bookings: Arc::new(MemoryBookingRepository::new()),
            tickets: Arc::new(MemoryTicketRepository::new()),
            history: Arc::new(MemoryExecutionHistory::new(
                workflows.history_limit,
                Duration::from_secs(workflows.history_retention_seconds),
            )),
            leases: Arc::new(MemoryLeaseStore::new()),
            health: Arc::new(MemoryHealth),
        }
    }

    /// Builds the configured backend, running migrations for Postgres and
    /// loading the seed file when one is configured.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let stores = match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Self::memory(&config.workflows)
            }
            StorageBackend::Postgres => {
                let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
                db.migrate().await?;
                let redis = RedisClient::new(&config.redis.url).await?;

                Self {
                    pois: Arc::new(StorePoiRepository::new(db.pool.clone())),
                    bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
                    tickets: Arc::new(StoreTicketRepository::new(db.pool.clone())),
                    history: Arc::new(RedisExecutionHistory::new(
                        redis.clone(),
                        config.workflows.history_limit,
                        Duration::from_secs(config.workflows.history_retention_seconds),
                    )),
                    leases: Arc::new(RedisLeaseStore::new(redis)),
                    health: Arc::new(db),
                }
            }
        };

        if let Some(path) = &config.storage.seed_file {
            let count = load_seed(path, stores.pois.as_ref()).await?;
            info!(path = %path, count, "Loaded POI seed file");
        }

        Ok(stores)
    }
}

/// Upserts every POI from a JSON array file.
pub async fn load_seed(path: &str, pois: &dyn PoiRepository) -> Result<usize, StoreError> {
    let seed_error = |message: String| StoreError::Seed {
        path: path.to_string(),
        message,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| seed_error(e.to_string()))?;
    let entries: Vec<Poi> = serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))?;

    for poi in &entries {
        pois.upsert_poi(poi).await.map_err(|e| seed_error(e.to_string()))?;
    }
    Ok(entries.len())
}
