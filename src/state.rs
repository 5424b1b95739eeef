use std::sync::Arc;

use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::error::{AppError, Result};
use crate::events::EventBus;
use crate::group::GroupService;
use crate::membership::MembershipService;
use crate::request::RequestService;
use crate::store::{MemStore, PgStore, Store};

/// Runtime configuration, read from the environment.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| AppError::Internal("DATABASE_URL must be set".into()))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
        })
    }
}

/// Shared handles to the store, cache, event bus and the three services.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub events: Arc<EventBus>,
    pub groups: GroupService,
    pub memberships: MembershipService,
    pub requests: RequestService,
}

impl AppState {
    fn build(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        let events = Arc::new(EventBus::standard());
        let groups = GroupService::new(store.clone(), cache.clone(), events.clone());
        let memberships = MembershipService::new(store.clone(), cache.clone(), events.clone());
        let requests = RequestService::new(store.clone(), cache.clone(), events.clone());
        Self { store, cache, events, groups, memberships, requests }
    }

    /// Postgres store plus Redis cache, per `Config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(PgStore::connect(&config.database_url).await?);
        let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(&config.redis_url).await?);
        Ok(Self::build(store, cache))
    }

    /// Fully in-process state, used by tests and embedded callers.
    pub fn in_memory() -> Self {
        Self::build(Arc::new(MemStore::new()), Arc::new(MemoryCache::new()))
    }
}
