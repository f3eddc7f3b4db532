use crate::error::{Error, Result};
use crate::solver::{DEFAULT_MAX_DURATION, DEFAULT_MAX_STEPS, SearchLimits};
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP adapter listens on
    pub bind_addr: SocketAddr,
    /// Search limits applied when a request omits its budget
    pub limits: SearchLimits,
    /// Schedules computed at the same time
    pub max_concurrent: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = match lookup("SCHEDULER_BIND_ADDR") {
            Some(value) => parse("SCHEDULER_BIND_ADDR", &value)?,
            None => parse("SCHEDULER_BIND_ADDR", DEFAULT_BIND_ADDR)?,
        };
        let max_steps = lookup("SCHEDULER_MAX_STEPS")
            .map(|v| parse("SCHEDULER_MAX_STEPS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_STEPS);
        let max_duration = lookup("SCHEDULER_MAX_DURATION_MS")
            .map(|v| parse("SCHEDULER_MAX_DURATION_MS", &v))
            .transpose()?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAX_DURATION);
        let max_concurrent = lookup("SCHEDULER_MAX_CONCURRENT")
            .map(|v| parse("SCHEDULER_MAX_CONCURRENT", &v))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_CONCURRENT);
        if max_concurrent == 0 {
            return Err(Error::Config(
                "SCHEDULER_MAX_CONCURRENT must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            limits: SearchLimits {
                max_steps,
                max_duration,
            },
            max_concurrent,
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}
