use std::{env, fmt::Display, str::FromStr};

use anyhow::{anyhow, ensure, Context};
use tracing::info;

use crate::dashboard::MAX_WINDOW_DAYS;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DASHBOARD_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub dashboard_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        Ok(Self {
            database_url,
            max_connections: load_or(
                "ATTENDANCE_MAX_CONNECTIONS",
                env::var("ATTENDANCE_MAX_CONNECTIONS").ok(),
                DEFAULT_MAX_CONNECTIONS,
            )?,
            dashboard_days: dashboard_days(env::var("ATTENDANCE_DASHBOARD_DAYS").ok())?,
        })
    }
}

fn dashboard_days(raw: Option<String>) -> anyhow::Result<i64> {
    let days = load_or("ATTENDANCE_DASHBOARD_DAYS", raw, DEFAULT_DASHBOARD_DAYS)?;
    ensure!(
        (1..=MAX_WINDOW_DAYS).contains(&days),
        "ATTENDANCE_DASHBOARD_DAYS must be between 1 and {MAX_WINDOW_DAYS}, got {days}"
    );
    Ok(days)
}

fn load_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key} value {value:?}: {e}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
