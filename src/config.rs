//! Process configuration, read once from the environment at start-up

use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;

const DEFAULT_DATABASE_URL: &str = "sqlite:database/catchseat.db";
/// Every ten minutes, on the minute
const DEFAULT_SCHEDULE: &str = "0 */10 * * * *";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;
const DEFAULT_SCREEN_FILTER: &str = "dolby";

/// Outbound mail settings
#[derive(Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub use_tls: bool,
    /// `From` header, e.g. `Catch-Seat <alerts@example.com>`
    pub sender: String,
}

/// Everything the runner, providers and notifier need
#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    /// Six-field cron expression for the periodic runner
    pub schedule: String,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
    /// Megabox screen-name filter, `None` keeps every screen
    pub screen_filter: Option<String>,
    pub smtp: SmtpConfig,
}

impl Config {
    /// Reads `CATCHSEAT_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let non_empty = |key: &str| var(key).filter(|v| !v.is_empty());

        let fetch_timeout_secs = match non_empty("CATCHSEAT_FETCH_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CATCHSEAT_FETCH_TIMEOUT_SECS is not a number: {raw}"))
                .map(|secs| secs.max(1))?,
            None => DEFAULT_FETCH_TIMEOUT_SECS,
        };

        let max_concurrent_fetches = match non_empty("CATCHSEAT_MAX_CONCURRENT_FETCHES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| {
                    format!("CATCHSEAT_MAX_CONCURRENT_FETCHES is not a number: {raw}")
                })?
                .max(1),
            None => DEFAULT_MAX_CONCURRENT_FETCHES,
        };

        // Unset means the default filter, an explicitly empty value disables it
        let screen_filter = match var("CATCHSEAT_SCREEN_FILTER") {
            Some(filter) if filter.is_empty() => None,
            Some(filter) => Some(filter),
            None => Some(DEFAULT_SCREEN_FILTER.to_string()),
        };

        let port = match non_empty("CATCHSEAT_SMTP_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("CATCHSEAT_SMTP_PORT is not a port number: {raw}"))?,
            None => 587,
        };

        let user = non_empty("CATCHSEAT_SMTP_USER");
        let password = non_empty("CATCHSEAT_SMTP_PASS")
            .or_else(|| non_empty("CATCHSEAT_SMTP_PASSWORD"))
            .map(SecretString::from);
        let sender = non_empty("CATCHSEAT_SMTP_DEFAULT_SENDER").unwrap_or_else(|| {
            format!("Catch-Seat Alert Service <{}>", user.as_deref().unwrap_or_default())
        });

        let smtp = SmtpConfig {
            host: non_empty("CATCHSEAT_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port,
            user,
            password,
            use_tls: non_empty("CATCHSEAT_SMTP_USE_TLS")
                .is_none_or(|raw| raw.eq_ignore_ascii_case("true")),
            sender,
        };

        Ok(Self {
            database_url: non_empty("CATCHSEAT_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            schedule: non_empty("CATCHSEAT_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_concurrent_fetches,
            screen_filter,
            smtp,
        })
    }
}
