use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::Context;
use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod api;
pub mod browser;
pub mod dtos;
pub mod error;
pub mod extraction;
pub mod extractors;
pub mod progress;
pub mod services;
pub mod subtitles;
pub mod utils;

use crate::config::AppConfig;
use crate::database::RedisDatabase;
use services::AppServices;

static START_INSTANT: OnceLock<Instant> = OnceLock::new();

/// crate version baked in at build time, reported on `/health`.
pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// seconds since the process came up, used by `/health` - backed by a lazily
/// initialized `Instant` rather than a wall-clock timestamp so clock skew or
/// NTP jumps don't feed back into the reported uptime.
pub fn get_uptime_seconds() -> u64 {
    START_INSTANT.get_or_init(Instant::now).elapsed().as_secs()
}

/// wires the axum app together and binds the listener. analogous to the
/// teacher's edge-only composition root - one process, redis + in-process
/// state, no database pool to juggle.
pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    pub async fn serve(config: Arc<AppConfig>, redis_db: RedisDatabase) -> anyhow::Result<()> {
        START_INSTANT.get_or_init(Instant::now);

        let services = AppServices::new(redis_db, config.clone());

        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install prometheus recorder")?;

        let app = Self::build_router(services, &config)
            .route(
                "/metrics",
                get(move || {
                    let handle = metrics_handle.clone();
                    async move { handle.render() }
                }),
            )
            .layer(NormalizePathLayer::trim_trailing_slash())
            .layer(TraceLayer::new_for_http());

        let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
            .parse()
            .context("invalid bind address")?;

        info!("edge server listening on {addr}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind listener")?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .context("axum server exited")?;

        Ok(())
    }

    fn build_router(services: AppServices, config: &AppConfig) -> Router {
        let cors = Self::cors_layer(config);

        Router::new()
            .route("/health", get(api::health_controller::health_endpoint))
            .merge(api::extract_controller::ExtractController::app())
            .nest("/api", api::subtitle_controller::SubtitleController::app())
            .nest("/stream-proxy", api::proxy_controller::ProxyController::app())
            .layer(cors)
            .layer(Extension(services))
    }

    /// cors_origin is the production allow-list, preview_cors_origin covers
    /// preview/staging deploys that hit the same edge service - either side
    /// being "*" opens the route up entirely, an explicit opt-in rather than
    /// a default.
    fn cors_layer(config: &AppConfig) -> CorsLayer {
        let combined: Vec<String> = config
            .cors_origin
            .split(',')
            .chain(config.preview_cors_origin.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if combined.iter().any(|origin| origin == "*") {
            return CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any);
        }

        let origins: Vec<axum::http::HeaderValue> = combined
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}
