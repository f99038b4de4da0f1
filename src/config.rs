use std::env;
use std::time::Duration;

/// Runtime configuration, read from environment variables with defaults
/// matching the reference deployment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub history_capacity: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 2052,
            history_capacity: 100,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            port: parse_var("CHAT_RELAY_PORT", defaults.port),
            history_capacity: parse_var("CHAT_RELAY_HISTORY_CAPACITY", defaults.history_capacity),
            idle_timeout: Duration::from_secs(parse_var(
                "CHAT_RELAY_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            sweep_interval: Duration::from_secs(parse_var(
                "CHAT_RELAY_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
