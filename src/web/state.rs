use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    config::AppConfig,
    domain::Engine,
    notify::{LogDispatcher, MailtrapDispatcher, NotificationDispatcher},
    objects::LocalObjectStore,
    security::{Argon2Verifier, HmacTokenIssuer},
    store::PgStore,
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine<PgStore>>,
    config: Arc<AppConfig>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        tokio::fs::create_dir_all(&config.storage_root)
            .await
            .with_context(|| {
                format!(
                    "failed to ensure storage root at {}",
                    config.storage_root.display()
                )
            })?;

        let notifier: Arc<dyn NotificationDispatcher> = match &config.mailtrap {
            Some(mailtrap) => Arc::new(
                MailtrapDispatcher::new(mailtrap.clone())
                    .context("failed to initialize Mailtrap dispatcher")?,
            ),
            None => {
                info!("MAILTRAP_TOKEN not set; notifications will only be logged");
                Arc::new(LogDispatcher)
            }
        };

        let engine = Engine::new(
            PgStore::new(pool),
            Arc::new(Argon2Verifier),
            Arc::new(HmacTokenIssuer::new(config.token_secret.clone().into_bytes())),
            notifier,
            Arc::new(LocalObjectStore::new(
                config.storage_root.clone(),
                config.public_base_url.clone(),
            )),
            config.client_url.clone(),
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        })
    }

    pub async fn ensure_seed_admin(&self) -> Result<()> {
        self.engine
            .ensure_seed_admin(
                &self.config.seed_admin_email,
                &self.config.seed_admin_password,
            )
            .await
            .map_err(|err| anyhow!("failed to seed admin account: {err}"))?;
        Ok(())
    }

    pub fn engine(&self) -> &Engine<PgStore> {
        &self.engine
    }
}
