use std::{env, time::Duration};

use ledger_common::{helpers::parse_env_var, DEFAULT_CURRENCY_CODE};
use log::*;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_OTP_VALIDITY: Duration = Duration::from_secs(600);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

/// Engine settings, read from `LEDGER_*` environment variables.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long an OTP may be used for after it was issued. `None` means OTPs never expire.
    pub otp_validity: Option<Duration>,
    pub default_currency: String,
    /// Capacity of each event handler's queue.
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            otp_validity: Some(DEFAULT_OTP_VALIDITY),
            default_currency: DEFAULT_CURRENCY_CODE.to_string(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("LEDGER_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ LEDGER_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env_or_default("LEDGER_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let otp_validity = match env_or_default("LEDGER_OTP_VALIDITY_SECS", DEFAULT_OTP_VALIDITY.as_secs()) {
            0 => {
                info!("🪛️ LEDGER_OTP_VALIDITY_SECS is 0. One-time passcodes will not expire.");
                None
            },
            secs => Some(Duration::from_secs(secs)),
        };
        let default_currency = env::var("LEDGER_DEFAULT_CURRENCY")
            .ok()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY_CODE.to_string());
        let event_buffer_size = env_or_default("LEDGER_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        Self { database_url, max_connections, otp_validity, default_currency, event_buffer_size }
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match parse_env_var::<T>(var) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err(e) => {
            error!("🪛️ {e} Using the default, {default}, instead.");
            default
        },
    }
}
