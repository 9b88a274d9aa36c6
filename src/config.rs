use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};

use crate::{notify::MailtrapConfig, security::MIN_SECRET_LEN};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STORAGE_ROOT: &str = "storage/documents";
const DEFAULT_SEED_ADMIN_EMAIL: &str = "admin@notecraft.local";
const DEFAULT_SEED_ADMIN_PASSWORD: &str = "change-me";
const DEFAULT_SENDER_NAME: &str = "NoteCraft";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub port: u16,
    pub token_secret: String,
    pub client_url: String,
    pub public_base_url: String,
    pub storage_root: PathBuf,
    /// `None` means notifications are only logged.
    pub mailtrap: Option<MailtrapConfig>,
    pub seed_admin_email: String,
    pub seed_admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let token_secret = var("TOKEN_SECRET").context("TOKEN_SECRET env var is missing")?;
        if token_secret.len() < MIN_SECRET_LEN {
            bail!("TOKEN_SECRET must be at least {MIN_SECRET_LEN} bytes long");
        }

        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;
        let db_max_connections = parse_or(
            var("DB_MAX_CONNECTIONS"),
            "DB_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let acquire_secs = parse_or(
            var("DB_ACQUIRE_TIMEOUT_SECS"),
            "DB_ACQUIRE_TIMEOUT_SECS",
            DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;

        let public_base_url =
            var("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let client_url = var("CLIENT_URL").unwrap_or_else(|| public_base_url.clone());

        let mailtrap = match var("MAILTRAP_TOKEN") {
            Some(token) => Some(MailtrapConfig {
                token,
                sender_email: var("MAILTRAP_SENDER_EMAIL").ok_or_else(|| {
                    anyhow!("MAILTRAP_SENDER_EMAIL is required when MAILTRAP_TOKEN is set")
                })?,
                sender_name: var("MAILTRAP_SENDER_NAME")
                    .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string()),
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(acquire_secs),
            port,
            token_secret,
            client_url,
            public_base_url,
            storage_root: var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            mailtrap,
            seed_admin_email: var("SEED_ADMIN_EMAIL")
                .unwrap_or_else(|| DEFAULT_SEED_ADMIN_EMAIL.to_string()),
            seed_admin_password: var("SEED_ADMIN_PASSWORD")
                .unwrap_or_else(|| DEFAULT_SEED_ADMIN_PASSWORD.to_string()),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .parse()
            .with_context(|| format!("{key} has an invalid value `{value}`")),
        None => Ok(default),
    }
}
