//! Airport resolver - natural-language route queries to IATA codes
//!
//! Resolves free text in any language ("Flüge von Frankfurt nach Liberia,
//! Costa Rica") into an origin/destination pair with:
//! - Tiered resolution, cheapest first (direct codes, corrections, gazetteer, cache, model)
//! - Deadline-bounded model calls with a strict flat schema
//! - Validation of low-confidence guesses against an external source
//! - TTL caches for extractions and user corrections

pub mod types;
pub mod error;
pub mod config;
pub mod normalize;
pub mod gazetteer;
pub mod cache;
pub mod model;
pub mod http_model;   // OpenAI-compatible model client
pub mod validator;
pub mod tiers;
pub mod orchestrator;
pub mod server;

pub use types::*;
pub use error::{ResolverError, Result};
pub use config::ResolverConfig;
pub use gazetteer::StaticGazetteer;
pub use cache::{CorrectionStore, ExtractionCache, TtlLruCache};
pub use model::{LanguageModel, ModelRecord, ModelResolver, ScriptedModel};
pub use http_model::HttpLanguageModel;
pub use validator::{CodeValidator, HttpCodeValidator, StaticCodeValidator};
pub use tiers::{ResolutionTier, TierOutcome};
pub use orchestrator::{ResolutionOrchestrator, SharedOrchestrator, StatsSnapshot};
