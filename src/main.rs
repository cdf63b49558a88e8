//! heron-chat - streaming conversational relay server
//!
//! Wires a hosted chat-completion API to a browser chat UI: one model turn
//! per user message, history kept in memory, responses streamed
//! token-by-token over SSE.

mod api;
mod config;
mod llm;
mod presenter;
mod store;
mod turn;

use api::{create_router, AppState};
use config::AppConfig;
use llm::{ChatModel, LoggingModel, OpenRouterModel};
use store::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turn::TurnProcessor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heron_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration is resolved once; a missing credential stops the server
    // here rather than failing every turn later.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let model: Arc<dyn ChatModel> = Arc::new(OpenRouterModel::new(&config));
    let model = Arc::new(LoggingModel::new(model));
    tracing::info!(
        model = %model.model_id(),
        base_url = %config.base_url,
        temperature = config.temperature,
        "Model client initialized"
    );

    // Create application state
    let store = SessionStore::new();
    let processor = Arc::new(TurnProcessor::new(store, model));
    let state = AppState::new(processor);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("heron-chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
