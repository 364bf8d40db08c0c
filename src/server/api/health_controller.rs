use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error};

use crate::server::dtos::health_dto::{
    BrowserHealth, DatabaseHealth, HealthResponse, HealthStatus, JobsHealth, RedisHealth,
    ServiceHealthDetails,
};
use crate::server::services::app_services::AppServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// Maximum allowed time for health check to complete
const HEALTH_CHECK_TIMEOUT_MS: u64 = 2000;

/// Lightweight health endpoint, doesn't block on browser pool or job state,
/// only on a short-timeout Redis ping.
pub async fn health_endpoint(
    Extension(services): Extension<AppServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let redis_health = tokio::time::timeout(
        std::time::Duration::from_millis(1500),
        check_redis_health(&services),
    )
    .await
    .unwrap_or_else(|_| {
        debug!("redis health check timed out");
        RedisHealth {
            status: HealthStatus::Degraded,
            response_time_ms: HEALTH_CHECK_TIMEOUT_MS as f64,
        }
    });

    let db_health = DatabaseHealth {
        status: HealthStatus::Healthy, // no relational store, redis is the only dependency
        response_time_ms: 0.0,
        pool_active: 0,
        pool_max: 0,
    };

    let overall_status = match redis_health.status {
        HealthStatus::Unhealthy => HealthStatus::Degraded,
        other => other,
    };

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    debug!("health check completed in {:.2}ms", elapsed_ms);

    let pool_stats = services.browser_pool.stats();
    let active_jobs = services.job_registry.active_count().await;

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            database: db_health,
            redis: redis_health,
        },
        browsers: BrowserHealth {
            active: pool_stats.active,
            pooled: pool_stats.pooled,
        },
        jobs: JobsHealth { active: active_jobs },
    };

    let http_status = match overall_status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (http_status, Json(response))
}

async fn check_redis_health(services: &AppServices) -> RedisHealth {
    match services.redis.health_check().await {
        Ok(response_time) => RedisHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("redis health check failed: {}", e);
            RedisHealth {
                status: HealthStatus::Degraded,
                response_time_ms: 0.0,
            }
        }
    }
}
