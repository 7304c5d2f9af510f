/// Health check and metrics endpoints
///
/// Supports two types of probes:
/// - Liveness: Is the process alive? (restart if not)
/// - Readiness: Can it serve traffic? (remove from load balancer if not)
///
/// The detailed report covers the database, the media host and the mailer.
use crate::{context::AppContext, jobs, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    pub version: String,

    pub uptime_seconds: f64,

    /// Individual component checks
    pub checks: Vec<ComponentHealth>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// Status: "healthy", "degraded", or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(metrics_handler))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness probe: answering at all means alive
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: 503 until the database answers
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = jobs::tasks::health_check(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Detailed health check with all component statuses
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();

    let checks = vec![
        check_database_detailed(&ctx).await,
        check_media_detailed(&ctx),
        check_mailer_detailed(&ctx),
    ];

    let overall_status = determine_overall_status(&checks);

    let health = HealthStatus {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: metrics::uptime_seconds(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are unhealthy".to_string())
        },
    };

    let status_code = match overall_status.as_str() {
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    tracing::info!(
        status = %overall_status,
        duration_ms = start.elapsed().as_millis(),
        "health_check_completed"
    );

    (status_code, Json(health))
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

async fn check_database_detailed(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match jobs::tasks::health_check(ctx).await {
        Ok(_) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

fn check_media_detailed(ctx: &AppContext) -> ComponentHealth {
    ComponentHealth {
        name: "media_storage".to_string(),
        status: "healthy".to_string(),
        response_time_ms: None,
        error: None,
        details: Some(serde_json::json!({
            "backend": ctx.media_store.backend_name(),
        })),
    }
}

/// Running without SMTP is allowed but degrades notifications
fn check_mailer_detailed(ctx: &AppContext) -> ComponentHealth {
    let configured = ctx.mailer.is_configured();
    ComponentHealth {
        name: "email".to_string(),
        status: if configured { "healthy" } else { "degraded" }.to_string(),
        response_time_ms: None,
        error: if configured {
            None
        } else {
            Some("SMTP is not configured".to_string())
        },
        details: None,
    }
}

/// Determine overall health status from individual checks
fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    let unhealthy_count = checks.iter().filter(|c| c.status == "unhealthy").count();
    let degraded_count = checks.iter().filter(|c| c.status == "degraded").count();

    if unhealthy_count > 0 {
        "unhealthy".to_string()
    } else if degraded_count > 0 {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn component(name: &str, status: &str) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status: status.to_string(),
            response_time_ms: Some(5),
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        let healthy = vec![component("database", "healthy"), component("media_storage", "healthy")];
        assert_eq!(determine_overall_status(&healthy), "healthy");

        let degraded = vec![component("database", "healthy"), component("email", "degraded")];
        assert_eq!(determine_overall_status(&degraded), "degraded");

        let unhealthy = vec![component("database", "unhealthy"), component("email", "degraded")];
        assert_eq!(determine_overall_status(&unhealthy), "unhealthy");
    }

    #[tokio::test]
    async fn test_detailed_report_without_smtp_is_degraded() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::for_tests(dir.path().to_path_buf()).await.unwrap();

        let (status, Json(health)) = health_detailed(State(ctx)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "degraded");
        assert_eq!(health.checks.len(), 3);
        assert_eq!(health.checks[0].name, "database");
        assert_eq!(health.checks[0].status, "healthy");
    }
}
