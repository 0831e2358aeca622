use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use browserless_client::BrowserlessClient;
use leadscout_common::Config;
use leadscout_scout::infra::store::SqliteLeadStore;
use leadscout_scout::lexicon::Lexicon;
use leadscout_scout::traits::LanguageModel;
use leadscout_scout::RunController;

mod registry;
mod rest;

use registry::RunRegistry;

pub struct AppState {
    pub config: Config,
    pub controller: RunController,
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub store: Arc<SqliteLeadStore>,
    pub runs: RunRegistry,
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Runs
        .route("/api/scrape", post(rest::api_scrape))
        .route("/api/scrape/stop", post(rest::api_scrape_stop))
        // History
        .route("/api/queries", get(rest::api_queries))
        .route("/api/suggestions", get(rest::api_suggestions))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadscout=info".parse()?))
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let llm: Option<Arc<dyn LanguageModel>> = config.openai_api_key.as_deref().map(|key| {
        let mut client = OpenAi::new(key, config.openai_model.clone());
        if let Some(base) = &config.openai_base_url {
            client = client.with_base_url(base.clone());
        }
        Arc::new(client) as Arc<dyn LanguageModel>
    });
    if llm.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; runs will be refused and suggestions use static lists");
    }

    let fetcher = Arc::new(
        BrowserlessClient::new(&config.browserless_url, config.browserless_token.as_deref())
            .context("building browserless client")?,
    );
    let store = Arc::new(SqliteLeadStore::connect(&config.database_url).await?);
    let lexicon = Arc::new(Lexicon::load(config.lexicon_path.as_deref())?);

    let controller =
        RunController::new(llm.clone(), fetcher, store.clone(), lexicon).configured(&config);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let state = Arc::new(AppState {
        config,
        controller,
        llm,
        store,
        runs: RunRegistry::new(),
    });
    let app = build_router(state);

    info!("LeadScout API starting on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
