use anyhow::Context;
use doc_assistant::api::{create_router, AppState};
use doc_assistant::application::{DocumentService, HistoryService, QueryService};
use doc_assistant::infrastructure::{build_registry, AppConfig, EmbeddingApiClient, SqliteChatStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api=debug,doc_assistant=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let fmt = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_dir = std::env::var("APP_CONFIG_DIR").unwrap_or_else(|_| "config".into());
    let config = AppConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {config_dir}"))?;

    let store = Arc::new(
        SqliteChatStore::connect(&config.config.database)
            .await
            .context("failed to open chat history database")?,
    );
    let embedding = Arc::new(
        EmbeddingApiClient::new(&config.config.embedding)
            .context("failed to build embedding client")?,
    );
    let providers = build_registry(&config).context("failed to build LLM providers")?;
    if providers.is_empty() {
        tracing::warn!("no LLM provider configured, queries will be rejected");
    }
    info!(embedding_api = %config.config.embedding.api_url, "embedding service configured");

    let query_service =
        QueryService::new(providers, embedding.clone(), store.clone(), config.query_settings());
    let history_service = HistoryService::new(store);
    let document_service = DocumentService::new(embedding.clone(), embedding);

    let addr = SocketAddr::new(
        config.config.server.host.parse().context("invalid SERVER_HOST")?,
        config.config.server.port,
    );
    let state = AppState::new(config, query_service, history_service, document_service);
    let app = create_router(state);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
