/// HTTP server setup and routing
use crate::{
    api::{self, API_PREFIX},
    config::MediaBackendConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
    metrics::track_metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    // The front-end sends the session cookie, so the origin must be exact
    let origin = match HeaderValue::from_str(&ctx.config.service.client_url) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            tracing::warn!(
                "CLIENT_URL {:?} is not a valid origin ({}), cross-origin requests will be refused",
                ctx.config.service.client_url,
                e
            );
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = usize::try_from(ctx.config.media.max_upload_bytes).unwrap_or(usize::MAX);

    let mut router = Router::new()
        .merge(api::health::routes())
        .nest(API_PREFIX, api::routes());

    if let MediaBackendConfig::Disk { location, .. } = &ctx.config.media.backend {
        router = router.nest_service("/uploads", ServeDir::new(location));
    }

    router
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(middleware::from_fn(track_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Panneaux server listening on {}", addr);
    info!("   Client URL: {}", ctx.config.service.client_url);
    info!("   Media backend: {}", ctx.media_store.backend_name());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
