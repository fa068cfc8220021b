use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub poll_check_interval: Duration,
    pub draft_debounce: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:rusty_rooms.db".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:7878".to_string()),
            poll_check_interval: Duration::from_secs(nonzero_or(
                "POLL_CHECK_INTERVAL_SECONDS",
                load("POLL_CHECK_INTERVAL_SECONDS", 60),
                60,
            )),
            draft_debounce: Duration::from_millis(load("DRAFT_DEBOUNCE_MS", 400)),
        }
    }
}

fn load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}

// Timer periods must be positive
fn nonzero_or(key: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        warn!("Invalid {key} value 0, using default: {default}");
        default
    } else {
        value
    }
}
