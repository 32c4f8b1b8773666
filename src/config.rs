//! Runtime configuration for the resolver

use crate::error::{ResolverError, Result};
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "AIRPORT_RESOLVER_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Hard wall-clock bound on the model call
    pub model_deadline: Duration,
    pub validator_timeout: Duration,
    pub extraction_ttl: Duration,
    pub correction_ttl: Duration,
    /// How long the last result per key is remembered for slot inference
    pub recent_ttl: Duration,
    pub extraction_capacity: usize,
    pub correction_capacity: usize,
    pub recent_capacity: usize,
    pub sweep_interval: Duration,
    pub model_url: Option<String>,
    pub model_name: String,
    pub model_api_key: Option<String>,
    pub validator_url: Option<String>,
    pub port: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            model_deadline: Duration::from_millis(2000),
            validator_timeout: Duration::from_millis(500),
            extraction_ttl: Duration::from_secs(24 * 60 * 60),
            correction_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            recent_ttl: Duration::from_secs(60 * 60),
            extraction_capacity: 10_000,
            correction_capacity: 10_000,
            recent_capacity: 10_000,
            sweep_interval: Duration::from_secs(300),
            model_url: None,
            model_name: "gpt-4o-mini".to_string(),
            model_api_key: None,
            validator_url: None,
            port: 8090,
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `AIRPORT_RESOLVER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Build from an arbitrary variable source (unprefixed names)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "MODEL_DEADLINE_MS")? {
            cfg.model_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "VALIDATOR_TIMEOUT_MS")? {
            cfg.validator_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "EXTRACTION_TTL_SECS")? {
            cfg.extraction_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CORRECTION_TTL_SECS")? {
            cfg.correction_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "RECENT_TTL_SECS")? {
            cfg.recent_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "EXTRACTION_CAPACITY")? {
            cfg.extraction_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, "CORRECTION_CAPACITY")? {
            cfg.correction_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, "RECENT_CAPACITY")? {
            cfg.recent_capacity = n;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            cfg.port = port;
        }
        if let Some(name) = lookup("MODEL_NAME") {
            cfg.model_name = name;
        }
        cfg.model_url = lookup("MODEL_URL").or(cfg.model_url);
        cfg.model_api_key = lookup("MODEL_API_KEY").or(cfg.model_api_key);
        cfg.validator_url = lookup("VALIDATOR_URL").or(cfg.validator_url);

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_deadline.is_zero() {
            return Err(ResolverError::Config("model deadline must be non-zero".into()));
        }
        if self.correction_ttl <= self.extraction_ttl {
            return Err(ResolverError::Config(format!(
                "correction TTL ({:?}) must be longer than extraction TTL ({:?})",
                self.correction_ttl, self.extraction_ttl
            )));
        }
        if self.extraction_capacity == 0 || self.correction_capacity == 0 || self.recent_capacity == 0 {
            return Err(ResolverError::Config("cache capacities must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ResolverError::Config(format!("{}{}={:?} is not valid", ENV_PREFIX, name, raw))),
    }
}
