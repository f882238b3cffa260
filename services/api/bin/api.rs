//! Main Entrypoint for the Recipe Road API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading prompt templates.
//! 3. Initializing the recipe collaborators and the realtime voice provider.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use recipe_road_api::{
    config::Config, router::create_router, state::AppState, ws::provider::build_provider,
};
use recipe_road_core::{
    SessionConfig,
    formatter::{LLMRecipeFormatter, PlainTextRecipeFormatter, RecipeFormatter},
    llm_client::{LLMClient, OpenAICompatibleClient},
    registry::InMemorySessionRegistry,
    search::{LLMRecipeSearch, MockRecipeSearch, RecipeSearch},
    session::DEFAULT_INSTRUCTIONS,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Prompts ---
    let prompts = load_prompts(&config.prompts_path)?;
    let instructions_template = match prompts.get("assistant_instructions") {
        Some(template) => template.clone(),
        None => {
            warn!("assistant_instructions.md not found; using built-in instructions.");
            DEFAULT_INSTRUCTIONS.to_string()
        }
    };

    // --- 4. Initialize Shared Services ---
    let (search, formatter): (Arc<dyn RecipeSearch>, Arc<dyn RecipeFormatter>) =
        match &config.openai_api_key {
            Some(api_key) => {
                info!(model = %config.chat_model, "Using OpenAI for recipe search and formatting.");
                let openai_config = OpenAIConfig::new()
                    .with_api_key(api_key)
                    .with_api_base("https://api.openai.com/v1/");
                let llm: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
                    openai_config,
                    config.chat_model.clone(),
                ));
                (
                    Arc::new(LLMRecipeSearch::new(llm.clone(), prompts.clone())),
                    Arc::new(LLMRecipeFormatter::new(llm, prompts)),
                )
            }
            None => {
                warn!("OPENAI_API_KEY not set; using the mock search and plain-text formatter.");
                (Arc::new(MockRecipeSearch), Arc::new(PlainTextRecipeFormatter))
            }
        };

    let realtime = build_provider(&config)?;

    let app_state = Arc::new(AppState {
        registry: Arc::new(InMemorySessionRegistry::new()),
        search,
        formatter,
        realtime,
        session_config: SessionConfig {
            tick_interval: config.timer_tick,
            surface_transcripts: config.surface_transcripts,
            instructions_template,
        },
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        realtime_model = %config.realtime_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
