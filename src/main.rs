use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hydroviewer_service::api::{create_router, AppState};
use hydroviewer_service::config::Config;
use hydroviewer_service::fetcher::SptFetcher;
use hydroviewer_service::services::ForecastService;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hydroviewer_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    info!("Starting hydroviewer service against {}", config.api_source);

    // Wire the upstream fetcher into the forecast service
    let fetcher = SptFetcher::new(config.api_source.clone(), config.spt_token.clone());
    let forecast_service = ForecastService::new(fetcher);

    // Create API router
    let app_state = AppState { forecast_service };
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.server_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
