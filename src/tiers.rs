//! Resolution tiers, cheapest first
//!
//! Each tier answers `Hit` with a finished result or `Miss` to let the next
//! tier try. Tiers only read shared state; cache writes belong to the
//! orchestrator.

use crate::cache::{CorrectionStore, ExtractionCache};
use crate::error::ResolverError;
use crate::gazetteer::StaticGazetteer;
use crate::model::ModelResolver;
use crate::normalize::normalize_key;
use crate::types::*;
use crate::validator::CodeValidator;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GENERIC_CLARIFICATION: &str = "Please specify which airport you mean.";

/// One query as seen by every tier
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw: String,
    pub key: String,
}

impl QueryContext {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            key: normalize_key(raw),
        }
    }
}

#[derive(Debug)]
pub enum TierOutcome {
    Hit(ResolutionResult),
    Miss,
    /// A correction that leaves the destination open; later tiers fill it
    /// in underneath the corrected slot
    Partial(CorrectionEntry),
    /// The tier's backend failed; treated as a miss by the orchestrator
    Unavailable(ResolverError),
}

/// Trait for pluggable resolution strategies
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, query: &QueryContext) -> TierOutcome;
}

/// Apply the clarification rules to a route: the destination is required,
/// and any low-confidence slot must be confirmed by the user.
pub fn finalize(route: RoutePair, via: ResolvedVia, reasoning: Option<String>) -> ResolutionResult {
    let is_low = |c: &Option<AirportCandidate>| c.as_ref().map_or(false, |c| c.confidence < Confidence::Medium);

    let needs_clarification = route.destination.is_none() || is_low(&route.destination) || is_low(&route.origin);
    if !needs_clarification {
        return ResolutionResult::resolved(route, via);
    }

    let message = reasoning.unwrap_or_else(|| clarification_text(&route));
    ResolutionResult {
        origin: route.origin,
        destination: route.destination,
        needs_clarification: true,
        clarification_message: Some(message),
        resolved_via: Some(via),
    }
}

fn clarification_text(route: &RoutePair) -> String {
    let guesses: Vec<String> = [&route.origin, &route.destination]
        .into_iter()
        .flatten()
        .filter(|c| c.confidence < Confidence::Medium)
        .map(|c| c.label())
        .collect();

    if guesses.is_empty() {
        GENERIC_CLARIFICATION.to_string()
    } else {
        format!("Did you mean {}? {}", guesses.join(" and "), GENERIC_CLARIFICATION)
    }
}

/// "FRA to JFK", "FRA→JFK", "FRA-JFK", "FRA nach JFK"
///
/// Steps aside when the user has corrected the same query.
pub struct DirectCodeTier {
    corrections: Arc<CorrectionStore>,
}

impl DirectCodeTier {
    pub fn new(corrections: Arc<CorrectionStore>) -> Self {
        Self { corrections }
    }

    fn parse(raw: &str) -> Option<(IataCode, IataCode)> {
        static CODE_PAIR_RE: OnceLock<Regex> = OnceLock::new();
        let re = CODE_PAIR_RE.get_or_init(|| {
            Regex::new(
                r"^\s*([A-Z]{3})(?:\s+(?i:to|nach|naar|para|hacia|vers)\s+|\s*(?:→|->|–|-|/)\s*)([A-Z]{3})\s*$",
            )
            .unwrap()
        });

        let caps = re.captures(raw)?;
        let origin = IataCode::parse(&caps[1])?;
        let destination = IataCode::parse(&caps[2])?;
        (origin != destination).then_some((origin, destination))
    }
}

#[async_trait]
impl ResolutionTier for DirectCodeTier {
    fn name(&self) -> &'static str {
        "direct_code"
    }

    async fn attempt(&self, query: &QueryContext) -> TierOutcome {
        if self.corrections.contains(&query.key) {
            return TierOutcome::Miss;
        }
        match Self::parse(&query.raw) {
            Some((origin, destination)) => TierOutcome::Hit(ResolutionResult::resolved(
                RoutePair {
                    origin: Some(AirportCandidate::from_code(origin, Confidence::High)),
                    destination: Some(AirportCandidate::from_code(destination, Confidence::High)),
                },
                ResolvedVia::DirectCode,
            )),
            None => TierOutcome::Miss,
        }
    }
}

/// User corrections recorded for this exact normalized query
pub struct CorrectionTier {
    store: Arc<CorrectionStore>,
}

impl CorrectionTier {
    pub fn new(store: Arc<CorrectionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResolutionTier for CorrectionTier {
    fn name(&self) -> &'static str {
        "correction_cache"
    }

    async fn attempt(&self, query: &QueryContext) -> TierOutcome {
        match self.store.get(&query.key) {
            Some(entry) => {
                debug!(
                    "Correction hit for '{}': {} -> {}",
                    query.key, entry.slot, entry.corrected_code
                );
                let route = entry.apply();
                if route.destination.is_none() {
                    return TierOutcome::Partial(entry);
                }
                TierOutcome::Hit(finalize(route, ResolvedVia::CorrectionCache, None))
            }
            None => TierOutcome::Miss,
        }
    }
}

pub struct GazetteerTier {
    gazetteer: Arc<StaticGazetteer>,
}

impl GazetteerTier {
    pub fn new(gazetteer: Arc<StaticGazetteer>) -> Self {
        Self { gazetteer }
    }
}

#[async_trait]
impl ResolutionTier for GazetteerTier {
    fn name(&self) -> &'static str {
        "static_gazetteer"
    }

    async fn attempt(&self, query: &QueryContext) -> TierOutcome {
        match self.gazetteer.lookup(&query.raw) {
            Some(route) => TierOutcome::Hit(ResolutionResult::resolved(route, ResolvedVia::StaticGazetteer)),
            None => TierOutcome::Miss,
        }
    }
}

/// Previously accepted model resolutions
pub struct ExtractionCacheTier {
    cache: Arc<ExtractionCache>,
}

impl ExtractionCacheTier {
    pub fn new(cache: Arc<ExtractionCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ResolutionTier for ExtractionCacheTier {
    fn name(&self) -> &'static str {
        "extraction_cache"
    }

    async fn attempt(&self, query: &QueryContext) -> TierOutcome {
        match self.cache.get(&query.key) {
            Some(mut cached) => {
                cached.resolved_via = Some(ResolvedVia::ExtractionCache);
                TierOutcome::Hit(cached)
            }
            None => TierOutcome::Miss,
        }
    }
}

/// Language model under a hard deadline, with low-confidence screening
pub struct ModelTier {
    resolver: ModelResolver,
    validator: Arc<dyn CodeValidator>,
    deadline: Duration,
    validator_timeout: Duration,
}

impl ModelTier {
    pub fn new(
        resolver: ModelResolver,
        validator: Arc<dyn CodeValidator>,
        deadline: Duration,
        validator_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            validator,
            deadline,
            validator_timeout,
        }
    }

    /// Keep trusted candidates, send low ones through the validator.
    /// Returns the surviving candidate and whether the validator vouched for it.
    async fn screen(&self, slot: Slot, candidate: Option<AirportCandidate>) -> (Option<AirportCandidate>, bool) {
        let Some(candidate) = candidate else {
            return (None, false);
        };
        if candidate.confidence.is_trusted() {
            return (Some(candidate), false);
        }

        let verdict = tokio::time::timeout(
            self.validator_timeout,
            self.validator.is_valid_airport_code(&candidate.code),
        )
        .await;

        match verdict {
            Ok(Ok(true)) => (Some(candidate), true),
            Ok(Ok(false)) => {
                let err = ResolverError::InvalidCandidate(format!("{} {} is not an operating airport", slot, candidate.code));
                info!("{}", err);
                (None, false)
            }
            Ok(Err(e)) => {
                warn!("Validator '{}' failed for {}: {}; dropping {}", self.validator.name(), candidate.code, e, slot);
                (None, false)
            }
            Err(_) => {
                warn!("Validator '{}' timed out for {}; dropping {}", self.validator.name(), candidate.code, slot);
                (None, false)
            }
        }
    }
}

#[async_trait]
impl ResolutionTier for ModelTier {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn attempt(&self, query: &QueryContext) -> TierOutcome {
        if query.key.is_empty() {
            return TierOutcome::Miss;
        }

        debug!("Calling model '{}' for '{}'", self.resolver.model_name(), query.key);
        // Dropping the future on expiry abandons the in-flight call.
        let extraction = match tokio::time::timeout(self.deadline, self.resolver.extract(&query.raw)).await {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(e)) => return TierOutcome::Unavailable(e),
            Err(_) => return TierOutcome::Unavailable(ResolverError::ModelTimeout(self.deadline)),
        };

        let ((origin, origin_validated), (destination, destination_validated)) = futures::future::join(
            self.screen(Slot::Origin, extraction.origin),
            self.screen(Slot::Destination, extraction.destination),
        )
        .await;

        let via = if origin_validated || destination_validated {
            ResolvedVia::ModelValidated
        } else {
            ResolvedVia::Model
        };

        TierOutcome::Hit(finalize(RoutePair { origin, destination }, via, extraction.reasoning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRecord, ScriptedModel};
    use crate::validator::{StaticCodeValidator, UnreachableValidator};

    fn hit(outcome: TierOutcome) -> ResolutionResult {
        match outcome {
            TierOutcome::Hit(r) => r,
            other => panic!("expected hit, got {:?}", other),
        }
    }

    fn model_tier(model: ScriptedModel, validator: Arc<dyn CodeValidator>) -> ModelTier {
        ModelTier::new(
            ModelResolver::new(Arc::new(model)),
            validator,
            Duration::from_millis(200),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_direct_code_forms() {
        for q in ["FRA to JFK", "FRA → JFK", "FRA->JFK", "FRA-JFK", "FRA nach JFK", " FRA TO JFK "] {
            let (o, d) = DirectCodeTier::parse(q).unwrap_or_else(|| panic!("no parse for {:?}", q));
            assert_eq!((o.as_str(), d.as_str()), ("FRA", "JFK"));
        }
    }

    #[test]
    fn test_direct_code_rejects() {
        for q in ["fra to jfk", "one to two", "FRA to FRA", "FRA JFK LAX", "FRAN to JFK", "Fly FRA to JFK"] {
            assert!(DirectCodeTier::parse(q).is_none(), "unexpected parse for {:?}", q);
        }
    }

    fn correction(query: &str, slot: Slot, code: &str) -> CorrectionEntry {
        CorrectionEntry {
            normalized_key: normalize_key(query),
            slot,
            original_extracted_code: None,
            corrected_code: IataCode::parse(code).unwrap(),
            counterpart: None,
            created_at: 0,
        }
    }

    fn empty_corrections() -> Arc<CorrectionStore> {
        Arc::new(CorrectionStore::corrections(8, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_direct_code_tier_hit() {
        let tier = DirectCodeTier::new(empty_corrections());
        let r = hit(tier.attempt(&QueryContext::new("FRA to JFK")).await);
        assert_eq!(r.resolved_via, Some(ResolvedVia::DirectCode));
        assert_eq!(r.origin.unwrap().confidence, Confidence::High);
        assert!(!r.needs_clarification);
    }

    #[tokio::test]
    async fn test_direct_code_tier_defers_to_correction() {
        let store = empty_corrections();
        let ctx = QueryContext::new("FRA to JFK");
        store.insert(ctx.key.clone(), correction("FRA to JFK", Slot::Destination, "EWR"));

        let tier = DirectCodeTier::new(store.clone());
        assert!(matches!(tier.attempt(&ctx).await, TierOutcome::Miss));

        // Lookup does not count as a cache read
        assert_eq!(store.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_correction_tier_partial_when_destination_open() {
        let store = empty_corrections();
        let ctx = QueryContext::new("somewhere warm from home");
        store.insert(ctx.key.clone(), correction("somewhere warm from home", Slot::Origin, "MUC"));

        match CorrectionTier::new(store).attempt(&ctx).await {
            TierOutcome::Partial(entry) => assert_eq!(entry.corrected_code.as_str(), "MUC"),
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_correction_tier_hit_with_destination() {
        let store = empty_corrections();
        let ctx = QueryContext::new("nach Liberia");
        store.insert(ctx.key.clone(), correction("nach Liberia", Slot::Destination, "LIR"));

        let r = hit(CorrectionTier::new(store).attempt(&ctx).await);
        assert_eq!(r.resolved_via, Some(ResolvedVia::CorrectionCache));
        assert_eq!(r.destination.unwrap().code.as_str(), "LIR");
        assert!(!r.needs_clarification);
    }

    #[tokio::test]
    async fn test_extraction_cache_tier_rewrites_via() {
        let cache = Arc::new(ExtractionCache::extraction(8, Duration::from_secs(60)));
        let ctx = QueryContext::new("Hamburg nach Lima");
        let stored = ResolutionResult::resolved(
            RoutePair {
                origin: None,
                destination: Some(AirportCandidate::from_code(IataCode::parse("LIM").unwrap(), Confidence::High)),
            },
            ResolvedVia::Model,
        );
        cache.insert(ctx.key.clone(), stored);

        let r = hit(ExtractionCacheTier::new(cache).attempt(&ctx).await);
        assert_eq!(r.resolved_via, Some(ResolvedVia::ExtractionCache));
        assert_eq!(r.destination.unwrap().code.as_str(), "LIM");
    }

    #[tokio::test]
    async fn test_model_tier_accepts_medium() {
        let model = ScriptedModel::new().reply(
            "ab frankfurt richtung guanacaste",
            ModelRecord::default()
                .origin("FRA", "Frankfurt", "Germany", Confidence::High)
                .destination("LIR", "Liberia", "Costa Rica", Confidence::Medium),
        );
        let tier = model_tier(model, Arc::new(StaticCodeValidator::new(Vec::<String>::new())));
        let r = hit(tier.attempt(&QueryContext::new("ab Frankfurt Richtung Guanacaste")).await);

        assert_eq!(r.resolved_via, Some(ResolvedVia::Model));
        assert!(!r.needs_clarification);
        assert_eq!(r.destination.unwrap().code.as_str(), "LIR");
    }

    #[tokio::test]
    async fn test_model_tier_validates_low() {
        let model = ScriptedModel::new().reply(
            "nach liberia",
            ModelRecord::default().destination("LIR", "Liberia", "Costa Rica", Confidence::Low),
        );
        let tier = model_tier(model, Arc::new(StaticCodeValidator::new(["LIR"])));
        let r = hit(tier.attempt(&QueryContext::new("nach Liberia")).await);

        assert_eq!(r.resolved_via, Some(ResolvedVia::ModelValidated));
        assert!(r.needs_clarification);
        assert_eq!(r.destination.as_ref().unwrap().confidence, Confidence::Low);
        assert!(r.clarification_message.unwrap().contains("LIR"));
    }

    #[tokio::test]
    async fn test_model_tier_drops_invalid_low() {
        let model = ScriptedModel::new().reply(
            "nach atlantis",
            ModelRecord::default().destination("QQA", "Atlantis", "", Confidence::Low),
        );
        let tier = model_tier(model, Arc::new(StaticCodeValidator::new(["LIR"])));
        let r = hit(tier.attempt(&QueryContext::new("nach Atlantis")).await);

        assert!(r.destination.is_none());
        assert!(r.needs_clarification);
        assert_eq!(r.clarification_message.as_deref(), Some(GENERIC_CLARIFICATION));
    }

    #[tokio::test]
    async fn test_model_tier_fails_closed_on_validator_outage() {
        let model = ScriptedModel::new().reply(
            "nach liberia",
            ModelRecord::default().destination("LIR", "Liberia", "Costa Rica", Confidence::Low),
        );
        let tier = model_tier(model, Arc::new(UnreachableValidator));
        let r = hit(tier.attempt(&QueryContext::new("nach Liberia")).await);

        assert!(r.destination.is_none());
        assert_eq!(r.resolved_via, Some(ResolvedVia::Model));
    }

    #[tokio::test]
    async fn test_model_tier_unavailable_on_schema_violation() {
        let model = ScriptedModel::new().reply_raw("to tokyo", "{\"destination\": \"HND\"}");
        let tier = model_tier(model, Arc::new(UnreachableValidator));
        let outcome = tier.attempt(&QueryContext::new("to tokyo")).await;
        assert!(matches!(outcome, TierOutcome::Unavailable(ResolverError::ModelSchema(_))));
    }

    #[tokio::test]
    async fn test_model_tier_unavailable_on_deadline() {
        let model = ScriptedModel::new().with_delay(Duration::from_secs(5));
        let tier = model_tier(model, Arc::new(UnreachableValidator));
        let outcome = tier.attempt(&QueryContext::new("somewhere warm")).await;
        assert!(matches!(outcome, TierOutcome::Unavailable(ResolverError::ModelTimeout(_))));
    }

    #[test]
    fn test_finalize_uses_reasoning_when_present() {
        let r = finalize(
            RoutePair::default(),
            ResolvedVia::Model,
            Some("Liberia in Costa Rica or the country Liberia?".to_string()),
        );
        assert!(r.needs_clarification);
        assert_eq!(
            r.clarification_message.as_deref(),
            Some("Liberia in Costa Rica or the country Liberia?")
        );
    }

    #[test]
    fn test_finalize_origin_optional() {
        let dest = AirportCandidate::from_code(IataCode::parse("SJO").unwrap(), Confidence::High);
        let r = finalize(
            RoutePair { origin: None, destination: Some(dest) },
            ResolvedVia::Model,
            Some("ignored".to_string()),
        );
        assert!(!r.needs_clarification);
        assert!(r.clarification_message.is_none());
    }
}
