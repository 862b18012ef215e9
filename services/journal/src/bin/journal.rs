//! services/journal/src/bin/journal.rs

use std::sync::Arc;
use std::time::Duration;

use async_openai::{config::OpenAIConfig, Client};
use for_me_core::{AdGate, DocumentStore, IdentityProvider, KeyValueStore, RecordStore, SummaryCache};
use journal_lib::{
    adapters::{FirestoreAdapter, HeadlessHost, HouseAdNetwork, InMemoryDocumentStore, JsonFileSettings, OpenAiChatAdapter},
    config::{Config, RecordBackend},
    error::AppError,
    web::{rest::ApiDoc, router, state::AppState},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Local Settings: identity and summary cache ---
    let settings: Arc<dyn KeyValueStore> = Arc::new(JsonFileSettings::open(&config.settings_path)?);
    let identity = Arc::new(IdentityProvider::new(settings.clone()));
    let summaries = Arc::new(SummaryCache::load(settings));
    info!("Loaded {} cached summaries from {}", summaries.len(), config.settings_path.display());

    // --- 3. Record Store ---
    let documents: Arc<dyn DocumentStore> = match &config.record_backend {
        RecordBackend::Firestore { project_id, bearer_token, base_url } => {
            let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
            let adapter = FirestoreAdapter::new(http, project_id.clone(), bearer_token.clone());
            let adapter = match base_url {
                Some(url) => adapter.with_base_url(url.clone()),
                None => adapter,
            };
            info!("Using Firestore project {}", project_id);
            Arc::new(adapter)
        }
        RecordBackend::Memory => {
            warn!("Using the in-memory record store; records are lost on exit.");
            Arc::new(InMemoryDocumentStore::new())
        }
    };
    let records = Arc::new(RecordStore::new(documents));

    // --- 4. Chat Completion Adapter ---
    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(api_base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(api_base);
    }
    let completion = Arc::new(OpenAiChatAdapter::new(
        Client::with_config(openai_config),
        config.chat_model.clone(),
    ));

    // --- 5. Ads ---
    let ads = AdGate::new(
        Arc::new(HouseAdNetwork::default()),
        Arc::new(HeadlessHost),
        config.ad_units.clone(),
        config.ad_retry,
    );
    ads.preload_all().await;

    // --- 6. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        identity,
        records,
        summaries,
        ads: ads.clone(),
        completion,
        conversation: config.conversation.clone(),
    });

    // Merge the API router with the Swagger UI router for a complete application.
    let app = router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
            }
        })
        .await?;

    ads.shutdown();
    info!("Server stopped.");
    Ok(())
}
