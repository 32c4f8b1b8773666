//! Model-backed extraction of origin/destination airports
//!
//! The model is asked for a single flat JSON record. Anything that does not
//! deserialize into [`ModelRecord`] exactly is a schema violation and the
//! whole extraction fails; no field is trusted on a partially valid reply.

use crate::error::{ResolverError, Result};
use crate::normalize::normalize_key;
use crate::types::{AirportCandidate, Confidence, IataCode, Slot};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SCHEMA_NAME: &str = "airport_route";

const SYSTEM_PROMPT: &str = "\
You extract flight routes from travel requests written in any language.
Return the IATA airport code for the origin and the destination.

Rules:
- Use every hint in the request. A country, state or region named anywhere in \
the request decides between places that share a name, e.g. \"Liberia\" with \
\"Costa Rica\" is LIR, \"San Jose\" with \"Costa Rica\" is SJO.
- If a city has several airports and none is named, choose its main \
international airport.
- If the request gives no way to tell which place is meant, do not guess: \
set that slot's confidence to \"low\" (plausible reading) or \"none\" (no \
reading), and explain the ambiguity in `reasoning` as a short question the \
user can answer.
- A slot the request does not mention at all gets confidence \"none\" and null fields.
- Codes are exactly three uppercase letters.";

/// One structured-output request to a language model
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub schema_name: &'static str,
    pub schema: serde_json::Value,
}

/// Raw model seam: returns the model's JSON text for a structured request
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &StructuredRequest) -> anyhow::Result<String>;
}

/// The flat record the model must return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRecord {
    pub origin_code: Option<String>,
    pub origin_airport_name: Option<String>,
    pub origin_city: Option<String>,
    pub origin_country: Option<String>,
    pub origin_confidence: Confidence,
    pub destination_code: Option<String>,
    pub destination_airport_name: Option<String>,
    pub destination_city: Option<String>,
    pub destination_country: Option<String>,
    pub destination_confidence: Confidence,
    pub reasoning: Option<String>,
}

impl ModelRecord {
    pub fn origin(mut self, code: &str, city: &str, country: &str, confidence: Confidence) -> Self {
        self.origin_code = Some(code.to_string());
        self.origin_airport_name = Some(format!("{} Airport", city));
        self.origin_city = Some(city.to_string());
        self.origin_country = Some(country.to_string());
        self.origin_confidence = confidence;
        self
    }

    pub fn destination(mut self, code: &str, city: &str, country: &str, confidence: Confidence) -> Self {
        self.destination_code = Some(code.to_string());
        self.destination_airport_name = Some(format!("{} Airport", city));
        self.destination_city = Some(city.to_string());
        self.destination_country = Some(country.to_string());
        self.destination_confidence = confidence;
        self
    }

    pub fn reasoning(mut self, text: &str) -> Self {
        self.reasoning = Some(text.to_string());
        self
    }

    /// Turn one slot of the record into a candidate, or `None` when the model
    /// declined (`none`) or produced an unusable code.
    fn candidate(&self, slot: Slot) -> Option<AirportCandidate> {
        let (code, name, city, country, confidence) = match slot {
            Slot::Origin => (
                &self.origin_code,
                &self.origin_airport_name,
                &self.origin_city,
                &self.origin_country,
                self.origin_confidence,
            ),
            Slot::Destination => (
                &self.destination_code,
                &self.destination_airport_name,
                &self.destination_city,
                &self.destination_country,
                self.destination_confidence,
            ),
        };

        if confidence == Confidence::None {
            return None;
        }
        let raw = code.as_deref()?;
        let Some(code) = IataCode::parse_loose(raw) else {
            let err = ResolverError::InvalidCandidate(format!("{} code {:?}", slot, raw));
            warn!("Dropping model {}: {}", slot, err);
            return None;
        };

        Some(AirportCandidate {
            display_name: name.clone().unwrap_or_else(|| code.to_string()),
            city_name: city.clone().unwrap_or_default(),
            country_name: country.clone().unwrap_or_default(),
            code,
            confidence,
        })
    }
}

/// Validated extraction handed back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ModelExtraction {
    pub origin: Option<AirportCandidate>,
    pub destination: Option<AirportCandidate>,
    pub reasoning: Option<String>,
}

/// JSON schema sent alongside the prompt. Kept flat on purpose.
pub fn response_schema() -> serde_json::Value {
    let nullable_str = json!({ "type": ["string", "null"] });
    let code = json!({ "type": ["string", "null"], "pattern": "^[A-Z]{3}$" });
    let confidence = json!({ "type": "string", "enum": ["high", "medium", "low", "none"] });

    let mut properties = serde_json::Map::new();
    for slot in ["origin", "destination"] {
        properties.insert(format!("{}_code", slot), code.clone());
        properties.insert(format!("{}_airport_name", slot), nullable_str.clone());
        properties.insert(format!("{}_city", slot), nullable_str.clone());
        properties.insert(format!("{}_country", slot), nullable_str.clone());
        properties.insert(format!("{}_confidence", slot), confidence.clone());
    }
    properties.insert("reasoning".to_string(), nullable_str);

    let required: Vec<String> = properties.keys().cloned().collect();
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

/// Builds the prompt, calls the model and validates its reply.
///
/// Does no caching and holds no state besides the model handle.
#[derive(Clone)]
pub struct ModelResolver {
    model: Arc<dyn LanguageModel>,
}

impl ModelResolver {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn build_request(query: &str) -> StructuredRequest {
        StructuredRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_message: query.to_string(),
            schema_name: SCHEMA_NAME,
            schema: response_schema(),
        }
    }

    pub async fn extract(&self, query: &str) -> Result<ModelExtraction> {
        let request = Self::build_request(query);
        let raw = self
            .model
            .complete(&request)
            .await
            .map_err(|e| ResolverError::ModelTransport(format!("{:#}", e)))?;
        debug!(model = self.model.name(), "Model reply: {}", raw);
        parse_reply(&raw)
    }
}

/// Strictly parse a model reply into an extraction
pub fn parse_reply(raw: &str) -> Result<ModelExtraction> {
    let record: ModelRecord =
        serde_json::from_str(raw.trim()).map_err(|e| ResolverError::ModelSchema(e.to_string()))?;

    Ok(ModelExtraction {
        origin: record.candidate(Slot::Origin),
        destination: record.candidate(Slot::Destination),
        reasoning: record
            .reasoning
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
}

/// Canned behaviour for one query in [`ScriptedModel`]
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(String),
}

/// Fake model for tests and offline runs: canned replies keyed by normalized
/// query, optional artificial latency, and a call counter.
pub struct ScriptedModel {
    scripts: HashMap<String, Script>,
    fallback: Script,
    delay: Duration,
    calls: AtomicUsize,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// Unknown queries get an all-`none` record
    pub fn new() -> Self {
        let empty = serde_json::to_string(&ModelRecord::default()).unwrap_or_default();
        Self {
            scripts: HashMap::new(),
            fallback: Script::Reply(empty),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply(mut self, query: &str, record: ModelRecord) -> Self {
        let raw = serde_json::to_string(&record).unwrap_or_default();
        self.scripts.insert(normalize_key(query), Script::Reply(raw));
        self
    }

    pub fn reply_raw(mut self, query: &str, raw: &str) -> Self {
        self.scripts.insert(normalize_key(query), Script::Reply(raw.to_string()));
        self
    }

    pub fn fail(mut self, query: &str, message: &str) -> Self {
        self.scripts.insert(normalize_key(query), Script::Fail(message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &StructuredRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self
            .scripts
            .get(&normalize_key(&request.user_message))
            .unwrap_or(&self.fallback)
        {
            Script::Reply(raw) => Ok(raw.clone()),
            Script::Fail(msg) => Err(anyhow!(msg.clone())),
        }
    }
}
