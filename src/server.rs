use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    add_record, get_stats, health_check, list_records, record_exists, remove_record,
    trigger_backfill, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/escrows/finish", post(add_record))
                .route(
                    "/escrows/finish/:account/:sequence/:network",
                    delete(remove_record).get(record_exists),
                )
                .route("/escrows", post(list_records))
                .route("/stats", get(get_stats))
                .route("/backfill", post(trigger_backfill)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
