use axum::http::HeaderValue;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

use crate::state::AppState;

pub mod categories;
pub mod chunks;
pub mod distributions;
pub mod documents;
pub mod health;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let category_routes = Router::new().route(
        "/",
        get(categories::list_categories).post(categories::create_category),
    );

    let documents_routes = Router::new()
        .route("/", post(documents::register_document))
        .route("/:id", get(documents::get_document))
        .route("/:id/pipeline", get(documents::get_pipeline))
        .route(
            "/:id/silver-chunks",
            get(documents::list_silver_chunks).post(documents::create_silver_chunk),
        )
        .route(
            "/:id/gold-distributions",
            get(documents::list_gold_distributions),
        )
        .route("/:id/processing-stats", get(documents::get_processing_stats))
        .route("/:id/retry-gold", post(documents::retry_gold))
        .route("/:id/bronze/start", post(documents::start_bronze))
        .route("/:id/bronze", post(documents::complete_bronze));

    let distribution_routes = Router::new()
        .route("/:id/layers/:layer/dispatch", post(distributions::begin_dispatch))
        .route("/:id/layers/:layer/result", post(distributions::record_result));

    Router::new()
        .nest("/api/document-categories", category_routes)
        .nest("/api/documents", documents_routes)
        .route("/api/silver-chunks/:id", patch(chunks::update_chunk_status))
        .nest("/api/gold-distributions", distribution_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
}
