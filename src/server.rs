//! HTTP server for airport-code resolution

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{CorrectionEntry, ResolutionOrchestrator, ResolutionResult, Slot, StatsSnapshot};

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub query: String,
    pub corrected_code: String,
    /// Inferred from the last resolution of `query` when omitted
    #[serde(default)]
    pub slot: Option<Slot>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Resolve handler; ambiguity is a normal 200 with `needs_clarification`
async fn resolve_handler(
    State(orchestrator): State<Arc<ResolutionOrchestrator>>,
    Json(req): Json<ResolveRequest>,
) -> Json<ResolutionResult> {
    info!("Received resolve request: query='{}'", req.query);
    Json(orchestrator.resolve(&req.query).await)
}

async fn correction_handler(
    State(orchestrator): State<Arc<ResolutionOrchestrator>>,
    Json(req): Json<CorrectionRequest>,
) -> Result<(StatusCode, Json<CorrectionEntry>), (StatusCode, Json<ErrorResponse>)> {
    info!(
        "Received correction: query='{}', code='{}', slot={:?}",
        req.query, req.corrected_code, req.slot
    );

    let recorded = match req.slot {
        Some(slot) => orchestrator.record_slot_correction(&req.query, slot, &req.corrected_code),
        None => orchestrator.record_correction(&req.query, &req.corrected_code),
    };

    match recorded {
        Ok(entry) => Ok((StatusCode::CREATED, Json(entry))),
        Err(e) => {
            warn!("Correction rejected: {}", e);
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "Correction rejected".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn stats_handler(State(orchestrator): State<Arc<ResolutionOrchestrator>>) -> Json<StatsSnapshot> {
    Json(orchestrator.stats())
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "airport-resolver".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create and configure the HTTP server
pub fn create_router(orchestrator: Arc<ResolutionOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/resolve", post(resolve_handler))
        .route("/corrections", post(correction_handler))
        .with_state(orchestrator)
}

/// Run the HTTP server
pub async fn run_server(orchestrator: Arc<ResolutionOrchestrator>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting airport resolver on {}", addr);

    let app = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResolverConfig, ScriptedModel, StaticCodeValidator};

    fn orchestrator() -> Arc<ResolutionOrchestrator> {
        ResolutionOrchestrator::new(
            Arc::new(ScriptedModel::new()),
            Arc::new(StaticCodeValidator::new(["LIR"])),
            &ResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_resolve_handler() {
        let Json(result) = resolve_handler(
            State(orchestrator()),
            Json(ResolveRequest {
                query: "FRA to LIR".to_string(),
            }),
        )
        .await;
        assert_eq!(result.destination.unwrap().code.as_str(), "LIR");
    }

    #[tokio::test]
    async fn test_correction_handler_status_codes() {
        let orch = orchestrator();

        let ok = correction_handler(
            State(orch.clone()),
            Json(CorrectionRequest {
                query: "nach Liberia".to_string(),
                corrected_code: "LIR".to_string(),
                slot: Some(Slot::Destination),
            }),
        )
        .await;
        let (status, Json(entry)) = ok.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry.corrected_code.as_str(), "LIR");

        let bad = correction_handler(
            State(orch),
            Json(CorrectionRequest {
                query: "nach Liberia".to_string(),
                corrected_code: "Liberia".to_string(),
                slot: None,
            }),
        )
        .await;
        let (status, _) = bad.unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_correction_request_slot_optional() {
        let req: CorrectionRequest =
            serde_json::from_str(r#"{"query":"nach Liberia","corrected_code":"LIR"}"#).unwrap();
        assert!(req.slot.is_none());
        let req: CorrectionRequest =
            serde_json::from_str(r#"{"query":"x","corrected_code":"LIR","slot":"origin"}"#).unwrap();
        assert_eq!(req.slot, Some(Slot::Origin));
    }

    #[test]
    fn test_router_builds() {
        let _router = create_router(orchestrator());
    }
}
