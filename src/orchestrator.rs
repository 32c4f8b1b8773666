//! ResolutionOrchestrator: runs the tiers in order and owns every cache write

use crate::cache::{CacheStats, CorrectionStore, ExtractionCache, TtlLruCache};
use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::gazetteer::StaticGazetteer;
use crate::model::{LanguageModel, ModelResolver};
use crate::tiers::*;
use crate::types::*;
use crate::validator::CodeValidator;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Main resolution engine (thread-safe via Arc)
pub struct ResolutionOrchestrator {
    tiers: Vec<Box<dyn ResolutionTier>>,
    extraction_cache: Arc<ExtractionCache>,
    corrections: Arc<CorrectionStore>,
    /// Last result per key, clarifications included; only feeds corrections
    recent: TtlLruCache<ResolutionResult>,
    stats: ResolverStats,
}

pub type SharedOrchestrator = Arc<ResolutionOrchestrator>;

#[derive(Default)]
struct ResolverStats {
    resolutions: AtomicU64,
    clarifications: AtomicU64,
    unresolved: AtomicU64,
    model_failures: AtomicU64,
    corrections_stored: AtomicU64,
    corrections_rejected: AtomicU64,
    tier_hits: Mutex<BTreeMap<&'static str, u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub resolutions: u64,
    pub clarifications: u64,
    pub unresolved: u64,
    pub model_failures: u64,
    pub corrections_stored: u64,
    pub corrections_rejected: u64,
    pub tier_hits: BTreeMap<&'static str, u64>,
    pub caches: Vec<CacheStats>,
}

impl ResolutionOrchestrator {
    /// Create an orchestrator with the built-in gazetteer and fresh caches
    pub fn new(
        model: Arc<dyn LanguageModel>,
        validator: Arc<dyn CodeValidator>,
        config: &ResolverConfig,
    ) -> SharedOrchestrator {
        let extraction_cache = Arc::new(ExtractionCache::extraction(
            config.extraction_capacity,
            config.extraction_ttl,
        ));
        let corrections = Arc::new(CorrectionStore::corrections(
            config.correction_capacity,
            config.correction_ttl,
        ));
        Self::with_caches(model, validator, config, extraction_cache, corrections)
    }

    /// Same as `new`, but over caches the caller keeps a handle to
    pub fn with_caches(
        model: Arc<dyn LanguageModel>,
        validator: Arc<dyn CodeValidator>,
        config: &ResolverConfig,
        extraction_cache: Arc<ExtractionCache>,
        corrections: Arc<CorrectionStore>,
    ) -> SharedOrchestrator {
        let tiers = Self::default_tiers(
            ModelResolver::new(model),
            validator,
            config,
            extraction_cache.clone(),
            corrections.clone(),
        );
        Self::with_tiers(tiers, extraction_cache, corrections, config)
    }

    /// Fully custom tier list
    pub fn with_tiers(
        tiers: Vec<Box<dyn ResolutionTier>>,
        extraction_cache: Arc<ExtractionCache>,
        corrections: Arc<CorrectionStore>,
        config: &ResolverConfig,
    ) -> SharedOrchestrator {
        info!(
            "Resolution tiers: {}",
            tiers.iter().map(|t| t.name()).collect::<Vec<_>>().join(" -> ")
        );
        Arc::new(Self {
            tiers,
            extraction_cache,
            corrections,
            recent: TtlLruCache::new("recent", config.recent_capacity, config.recent_ttl),
            stats: ResolverStats::default(),
        })
    }

    /// Direct code, correction, gazetteer, extraction cache, model
    pub fn default_tiers(
        resolver: ModelResolver,
        validator: Arc<dyn CodeValidator>,
        config: &ResolverConfig,
        extraction_cache: Arc<ExtractionCache>,
        corrections: Arc<CorrectionStore>,
    ) -> Vec<Box<dyn ResolutionTier>> {
        vec![
            Box::new(DirectCodeTier::new(corrections.clone())),
            Box::new(CorrectionTier::new(corrections)),
            Box::new(GazetteerTier::new(StaticGazetteer::builtin())),
            Box::new(ExtractionCacheTier::new(extraction_cache)),
            Box::new(ModelTier::new(
                resolver,
                validator,
                config.model_deadline,
                config.validator_timeout,
            )),
        ]
    }

    /// Main entry point: resolve a free-text query into an origin/destination pair.
    ///
    /// Never fails; anything the tiers cannot settle comes back as a
    /// clarification request.
    pub async fn resolve(&self, query: &str) -> ResolutionResult {
        let start = Instant::now();
        let ctx = QueryContext::new(query);
        self.stats.resolutions.fetch_add(1, Ordering::Relaxed);

        debug!("Resolving '{}' (key '{}')", query, ctx.key);

        // Correction covering only the origin; laid over whatever a later tier finds
        let mut pinned: Option<CorrectionEntry> = None;

        for tier in &self.tiers {
            match tier.attempt(&ctx).await {
                TierOutcome::Hit(result) => {
                    self.after_hit(&ctx, tier.name(), &result);
                    let result = match pinned.take() {
                        Some(entry) => overlay(&entry, result),
                        None => result,
                    };
                    self.remember(&ctx, &result);
                    info!(
                        "Resolved '{}' via {} in {:?}: {} -> {}{}",
                        ctx.key,
                        tier.name(),
                        start.elapsed(),
                        describe(result.origin.as_ref()),
                        describe(result.destination.as_ref()),
                        if result.needs_clarification { " (needs clarification)" } else { "" },
                    );
                    return result;
                }
                TierOutcome::Partial(entry) => {
                    debug!("Tier {} pinned {} for '{}', looking further", tier.name(), entry.slot, ctx.key);
                    pinned = Some(entry);
                }
                TierOutcome::Miss => {
                    debug!("Tier {} missed for '{}'", tier.name(), ctx.key);
                }
                TierOutcome::Unavailable(e) => {
                    if e.is_model_unavailable() {
                        self.stats.model_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    warn!("Tier {} unavailable for '{}': {}", tier.name(), ctx.key, e);
                }
            }
        }

        let result = match pinned {
            Some(entry) => finalize(entry.apply(), ResolvedVia::CorrectionCache, None),
            None => {
                self.stats.unresolved.fetch_add(1, Ordering::Relaxed);
                ResolutionResult::unresolved(GENERIC_CLARIFICATION)
            }
        };
        self.remember(&ctx, &result);
        info!("No tier resolved '{}' in {:?}", ctx.key, start.elapsed());
        result
    }

    /// Tier-level bookkeeping for the raw hit; only model answers are cached
    fn after_hit(&self, ctx: &QueryContext, tier: &'static str, result: &ResolutionResult) {
        *self.stats.tier_hits.lock().entry(tier).or_insert(0) += 1;

        let from_model = matches!(
            result.resolved_via,
            Some(ResolvedVia::Model) | Some(ResolvedVia::ModelValidated)
        );
        if from_model && !result.needs_clarification && !ctx.key.is_empty() {
            self.extraction_cache.insert(ctx.key.clone(), result.clone());
        }
    }

    /// Bookkeeping for what the caller actually receives
    fn remember(&self, ctx: &QueryContext, result: &ResolutionResult) {
        if result.needs_clarification {
            self.stats.clarifications.fetch_add(1, Ordering::Relaxed);
        }
        self.recent.insert(ctx.key.clone(), result.clone());
    }

    /// Record a user correction, inferring which slot it replaces from the
    /// last resolution of the same query.
    pub fn record_correction(&self, query: &str, corrected_code: &str) -> Result<CorrectionEntry> {
        let key = crate::normalize::normalize_key(query);
        let slot = infer_slot(self.previous_result(&key).as_ref());
        self.record_slot_correction(query, slot, corrected_code)
    }

    /// Record a correction for an explicit slot.
    ///
    /// The only failure is a malformed code, in which case nothing is stored.
    /// Visible to the very next `resolve` of the same query.
    pub fn record_slot_correction(&self, query: &str, slot: Slot, corrected_code: &str) -> Result<CorrectionEntry> {
        let Some(code) = IataCode::parse_loose(corrected_code) else {
            self.stats.corrections_rejected.fetch_add(1, Ordering::Relaxed);
            let err = ResolverError::MalformedCorrection(corrected_code.to_string());
            warn!("Ignoring correction for '{}': {}", query, err);
            return Err(err);
        };

        let key = crate::normalize::normalize_key(query);
        let previous = self.previous_result(&key);

        let original_extracted_code = previous
            .as_ref()
            .and_then(|r| r.slot(slot))
            .map(|c| c.code.clone());
        let counterpart = previous
            .as_ref()
            .and_then(|r| r.slot(slot.other()))
            .filter(|c| c.confidence.is_trusted())
            .cloned();

        let entry = CorrectionEntry {
            normalized_key: key.clone(),
            slot,
            original_extracted_code,
            corrected_code: code,
            counterpart,
            created_at: unix_now(),
        };

        self.corrections.insert(key.clone(), entry.clone());
        self.extraction_cache.remove(&key);
        self.recent.remove(&key);
        self.stats.corrections_stored.fetch_add(1, Ordering::Relaxed);

        info!(
            "Stored correction for '{}': {} {} -> {}",
            key,
            slot,
            entry
                .original_extracted_code
                .as_ref()
                .map_or("-", |c| c.as_str()),
            entry.corrected_code
        );
        Ok(entry)
    }

    fn previous_result(&self, key: &str) -> Option<ResolutionResult> {
        self.recent.get(key).or_else(|| self.extraction_cache.get(key))
    }

    /// Drop expired entries from every cache; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.extraction_cache.purge_expired() + self.corrections.purge_expired() + self.recent.purge_expired()
    }

    /// Periodically purge expired entries until the orchestrator is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    debug!("Orchestrator dropped, stopping cache sweeper");
                    break;
                };
                let purged = orchestrator.purge_expired();
                if purged > 0 {
                    debug!("Cache sweep purged {} expired entries", purged);
                }
            }
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            resolutions: self.stats.resolutions.load(Ordering::Relaxed),
            clarifications: self.stats.clarifications.load(Ordering::Relaxed),
            unresolved: self.stats.unresolved.load(Ordering::Relaxed),
            model_failures: self.stats.model_failures.load(Ordering::Relaxed),
            corrections_stored: self.stats.corrections_stored.load(Ordering::Relaxed),
            corrections_rejected: self.stats.corrections_rejected.load(Ordering::Relaxed),
            tier_hits: self.stats.tier_hits.lock().clone(),
            caches: vec![
                self.extraction_cache.stats(),
                self.corrections.stats(),
                self.recent.stats(),
            ],
        }
    }
}

/// Slot a bare correction most likely targets
fn infer_slot(previous: Option<&ResolutionResult>) -> Slot {
    let Some(previous) = previous else {
        return Slot::Destination;
    };
    let destination_weak = previous
        .destination
        .as_ref()
        .map_or(true, |c| !c.confidence.is_trusted());
    let origin_low = previous
        .origin
        .as_ref()
        .map_or(false, |c| !c.confidence.is_trusted());

    if destination_weak {
        Slot::Destination
    } else if origin_low {
        Slot::Origin
    } else {
        Slot::Destination
    }
}

/// Corrected slot on top of a lower tier's answer. A clarification the lower
/// tier raised is kept only while the merged route still needs one.
fn overlay(entry: &CorrectionEntry, lower: ResolutionResult) -> ResolutionResult {
    let reasoning = lower
        .clarification_message
        .clone()
        .filter(|_| lower.needs_clarification && lower.resolved_via.is_some());
    finalize(entry.apply_over(lower.route()), ResolvedVia::CorrectionCache, reasoning)
}

fn describe(candidate: Option<&AirportCandidate>) -> String {
    candidate.map_or_else(|| "?".to_string(), |c| format!("{}[{:?}]", c.code, c.confidence))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
