use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    auth::jwt::JwtKeys,
    config::AppConfig,
    dashboard::stats::{PlaceholderStats, StatsProvider},
    middleware::rate_limit::RateLimiter,
    users::repo::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub stats: Arc<dyn StatsProvider>,
    pub auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Connects the pool and brings the schema up to date.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        tracing::info!("database ready");

        Ok(Self::from_parts(
            Arc::new(PgUserStore::new(db)),
            Arc::new(config),
            Arc::new(PlaceholderStats),
        ))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        stats: Arc<dyn StatsProvider>,
    ) -> Self {
        Self {
            jwt: JwtKeys::new(&config.jwt),
            auth_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            users,
            config,
            stats,
        }
    }

    /// In-memory store and a fixed test configuration.
    #[cfg(test)]
    pub fn fake() -> (Self, Arc<crate::users::memory::MemoryUserStore>) {
        Self::fake_with(|_| None)
    }

    /// Like [`AppState::fake`], with extra config keys.
    #[cfg(test)]
    pub fn fake_with<F>(overrides: F) -> (Self, Arc<crate::users::memory::MemoryUserStore>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = AppConfig::from_lookup(|key| {
            overrides(key).or_else(|| match key {
                "DATABASE_URL" => Some("postgres://unused".to_string()),
                "JWT_SECRET" => Some("test-secret".to_string()),
                _ => None,
            })
        })
        .expect("test config");
        let store = Arc::new(crate::users::memory::MemoryUserStore::new());
        let state = Self::from_parts(store.clone(), Arc::new(config), Arc::new(PlaceholderStats));
        (state, store)
    }
}
