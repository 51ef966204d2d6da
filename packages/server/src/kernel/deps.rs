//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container handed to the flows
//! and actions. All external services sit behind trait objects so tests can
//! swap them for in-process doubles.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use twilio::TwilioService;

use crate::config::{AuthSettings, Config, NotifierSettings};
use crate::db::{MemoryUserDb, PostgresUserDb, UserDb};
use crate::domains::sessions::{session_storage, SessionStorage};
use crate::kernel::{
    kv_store_from_uri, BaseCodeGenerator, BaseKvStore, BaseNotifier, LogNotifier,
    RandomGenerator, TwilioNotifier,
};

/// Dependencies shared by every request
#[derive(Clone)]
pub struct ServerDeps {
    pub users: Arc<dyn UserDb>,
    pub kv: Arc<dyn BaseKvStore>,
    pub notifier: Arc<dyn BaseNotifier>,
    pub generator: Arc<dyn BaseCodeGenerator>,
    pub sessions: Arc<dyn SessionStorage>,
    pub auth: AuthSettings,
}

impl ServerDeps {
    pub fn new(
        users: Arc<dyn UserDb>,
        kv: Arc<dyn BaseKvStore>,
        notifier: Arc<dyn BaseNotifier>,
        generator: Arc<dyn BaseCodeGenerator>,
        sessions: Arc<dyn SessionStorage>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            users,
            kv,
            notifier,
            generator,
            sessions,
            auth,
        }
    }

    /// Connect every backend named by `config`
    pub async fn from_config(config: &Config) -> Result<Self> {
        let users: Arc<dyn UserDb> = if config.uses_memory_database() {
            info!("Using in-process user store");
            Arc::new(MemoryUserDb::new())
        } else {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&config.database_url)
                .await
                .context("Failed to connect to database")?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Migrations complete");

            Arc::new(PostgresUserDb::new(pool))
        };

        let kv = kv_store_from_uri(&config.storage_url)
            .await
            .context("Failed to open key-value storage")?;

        let notifier: Arc<dyn BaseNotifier> = match &config.notifier {
            NotifierSettings::Log => Arc::new(LogNotifier),
            NotifierSettings::Twilio(options) => Arc::new(TwilioNotifier::new(Arc::new(
                TwilioService::new(options.clone()),
            ))),
        };

        let generator = Arc::new(RandomGenerator::new(
            config.generator.code_len,
            &config.generator.code_alphabet,
        ));

        let sessions = session_storage(&config.auth, kv.clone())?;

        Ok(Self::new(
            users,
            kv,
            notifier,
            generator,
            sessions,
            config.auth.clone(),
        ))
    }
}
