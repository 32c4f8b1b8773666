//! Airport resolver HTTP server binary

use airport_resolver::{
    CodeValidator, HttpCodeValidator, HttpLanguageModel, LanguageModel, ModelRecord,
    ResolutionOrchestrator, ResolverConfig, ScriptedModel, StaticCodeValidator, StaticGazetteer,
    Confidence,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod server {
    pub use airport_resolver::server::*;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    println!("Airport Resolver");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = ResolverConfig::from_env()?;

    let model: Arc<dyn LanguageModel> = match config.model_url {
        Some(ref url) => {
            println!("✓ Model: {} at {}", config.model_name, url);
            if config.model_api_key.is_none() {
                eprintln!("⚠️  No AIRPORT_RESOLVER_MODEL_API_KEY set, calling without auth");
            }
            Arc::new(HttpLanguageModel::new(
                url.clone(),
                config.model_name.clone(),
                config.model_api_key.clone(),
            ))
        }
        None => {
            println!("✓ Model: MOCK (scripted replies)");
            println!("   (set AIRPORT_RESOLVER_MODEL_URL to call a real model)");
            Arc::new(create_mock_model())
        }
    };

    let validator: Arc<dyn CodeValidator> = match config.validator_url {
        Some(ref url) => {
            let client = HttpCodeValidator::new(url.clone());
            match client.health_check().await {
                Ok(true) => println!("✓ Airport API is healthy: {}", url),
                Ok(false) => eprintln!("⚠️  Airport API unhealthy, low-confidence guesses will be dropped: {}", url),
                Err(e) => eprintln!("⚠️  Airport API unreachable ({}), low-confidence guesses will be dropped", e),
            }
            Arc::new(client)
        }
        None => {
            println!("✓ Validator: built-in gazetteer codes");
            Arc::new(StaticCodeValidator::from_gazetteer(&StaticGazetteer::builtin()))
        }
    };

    println!(
        "✓ Model deadline {:?}, extraction TTL {:?}, correction TTL {:?}",
        config.model_deadline, config.extraction_ttl, config.correction_ttl
    );

    let orchestrator = ResolutionOrchestrator::new(model, validator, &config);
    let _sweeper = orchestrator.spawn_sweeper(config.sweep_interval);

    println!("✓ Resolver initialized");
    println!("✓ Starting HTTP server on port {}...", config.port);
    println!();

    server::run_server(orchestrator, config.port).await?;

    Ok(())
}

/// A handful of canned model answers for running without a model endpoint
fn create_mock_model() -> ScriptedModel {
    ScriptedModel::new()
        .reply(
            "Flüge nach Liberia",
            ModelRecord::default()
                .destination("LIR", "Liberia", "Costa Rica", Confidence::Low)
                .reasoning("Do you mean Liberia in Costa Rica (LIR) or Monrovia, Liberia (ROB)?"),
        )
        .reply(
            "ab Frankfurt Richtung Guanacaste",
            ModelRecord::default()
                .origin("FRA", "Frankfurt", "Germany", Confidence::High)
                .destination("LIR", "Liberia", "Costa Rica", Confidence::Medium),
        )
        .reply(
            "I want to fly from the Big Apple to the Windy City",
            ModelRecord::default()
                .origin("JFK", "New York", "United States", Confidence::Medium)
                .destination("ORD", "Chicago", "United States", Confidence::High),
        )
}
