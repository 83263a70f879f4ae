use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proposal_api::config::Config;
use proposal_api::db::create_pool;
use proposal_api::llm_client::{self, LlmClient};
use proposal_api::proposal::{Letterhead, LlmDrafter, PgProposalStore, ProposalComposer};
use proposal_api::routes::build_router;
use proposal_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("proposal_api={0},tower_http={0}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting proposal API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize the drafting transform when a key is configured
    let mut composer = ProposalComposer::new(Letterhead::default());
    match LlmClient::from_config(&config)? {
        Some(llm) if config.drafting_available() => {
            info!(
                "AI drafting enabled (model: {}, timeout: {:?})",
                llm_client::MODEL,
                config.drafting_timeout
            );
            composer = composer.with_drafter(Arc::new(LlmDrafter::new(llm)), config.drafting_timeout);
        }
        Some(_) => info!("AI drafting disabled by AI_DRAFTING_ENABLED"),
        None => warn!("ANTHROPIC_API_KEY not set; PDFs are exported without AI drafting"),
    }

    // Build app state
    let state = AppState {
        config: config.clone(),
        source: Arc::new(PgProposalStore::new(db)),
        composer,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
