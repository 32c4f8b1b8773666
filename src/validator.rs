//! Airport code validation against an external source of truth
//!
//! Callers must treat `Err` as "invalid": an unreachable validator never lets
//! an unverified code through.

use crate::error::{ResolverError, Result};
use crate::gazetteer::StaticGazetteer;
use crate::types::IataCode;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

#[async_trait]
pub trait CodeValidator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `code` denotes a real, currently operating airport
    async fn is_valid_airport_code(&self, code: &IataCode) -> Result<bool>;
}

/// In-process validator over a fixed code set
pub struct StaticCodeValidator {
    codes: HashSet<String>,
}

impl StaticCodeValidator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Every code the built-in gazetteer knows about
    pub fn from_gazetteer(gazetteer: &StaticGazetteer) -> Self {
        Self::new(gazetteer.known_codes())
    }
}

#[async_trait]
impl CodeValidator for StaticCodeValidator {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn is_valid_airport_code(&self, code: &IataCode) -> Result<bool> {
        Ok(self.codes.contains(code.as_str()))
    }
}

/// Validator that is always down; exercises the fail-closed path
pub struct UnreachableValidator;

#[async_trait]
impl CodeValidator for UnreachableValidator {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn is_valid_airport_code(&self, _code: &IataCode) -> Result<bool> {
        Err(ResolverError::ValidatorUnavailable("validator is unreachable".into()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AirportStatus {
    pub iata: String,
    #[serde(default)]
    pub operational: bool,
}

/// HTTP client for an airport reference-data API
#[derive(Debug, Clone)]
pub struct HttpCodeValidator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCodeValidator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the airport record; `None` when the API does not know the code
    pub async fn get_airport(&self, code: &str) -> anyhow::Result<Option<AirportStatus>> {
        let url = format!("{}/airports/{}", self.base_url, urlencoding::encode(code));

        debug!("Fetching airport status from {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Airport API error {}: {}", status, body);
        }

        let status: AirportStatus = response.json().await?;
        Ok(Some(status))
    }

    /// Health check
    pub async fn health_check(&self) -> anyhow::Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl CodeValidator for HttpCodeValidator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn is_valid_airport_code(&self, code: &IataCode) -> Result<bool> {
        match self.get_airport(code.as_str()).await {
            Ok(Some(status)) => Ok(status.operational && status.iata.eq_ignore_ascii_case(code.as_str())),
            Ok(None) => Ok(false),
            Err(e) => Err(ResolverError::ValidatorUnavailable(format!("{:#}", e))),
        }
    }
}
