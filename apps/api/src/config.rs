use std::time::Duration;

use anyhow::{Context, Result};

use crate::access::quota::{Quota, TierTable};
use crate::access::QuotaConfig;
use crate::session::SessionTimings;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub baas_url: String,
    pub baas_anon_key: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_public_url: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
    pub run_migrations: bool,
    pub sessions: SessionTimings,
    pub quotas: QuotaConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = QuotaConfig::default();
        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            baas_url: require_env("BAAS_URL")?,
            baas_anon_key: require_env("BAAS_ANON_KEY")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_public_url: require_env("S3_PUBLIC_URL")?,
            s3_region: optional_env("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: optional_env("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            run_migrations: optional_env("RUN_MIGRATIONS")
                .map(|v| parse_bool(&v))
                .transpose()
                .context("RUN_MIGRATIONS must be true or false")?
                .unwrap_or(true),
            sessions: SessionTimings {
                wait: Duration::from_millis(number_env("SESSION_WAIT_MS", 3000)?),
                revalidate: Duration::from_secs(number_env("SESSION_REVALIDATE_SECS", 60)?),
                idle: Duration::from_secs(number_env("SESSION_IDLE_SECS", 1800)?),
            },
            quotas: QuotaConfig {
                listings: quota_env("LISTING_QUOTA", defaults.listings)?,
                explore_feed: quota_env("EXPLORE_QUOTA", defaults.explore_feed)?,
            },
        };
        if config.sessions.revalidate.is_zero() || config.sessions.idle.is_zero() {
            anyhow::bail!("SESSION_REVALIDATE_SECS and SESSION_IDLE_SECS must be positive");
        }
        Ok(config)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn number_env(key: &str, default: u64) -> Result<u64> {
    match optional_env(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a whole number")),
        None => Ok(default),
    }
}

fn quota_env(key: &str, default: TierTable<Quota>) -> Result<TierTable<Quota>> {
    match optional_env(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{key} must look like '5,20,100' or '10,50,unlimited'")),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => anyhow::bail!("invalid boolean '{other}'"),
    }
}
