use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisHealth {
    pub status: HealthStatus,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub status: HealthStatus,
    pub response_time_ms: f64,
    pub pool_active: u32,
    pub pool_max: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserHealth {
    pub active: usize,
    pub pooled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealth {
    pub active: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealthDetails {
    pub database: DatabaseHealth,
    pub redis: RedisHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub services: ServiceHealthDetails,
    pub browsers: BrowserHealth,
    pub jobs: JobsHealth,
}
