use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::database::RedisDatabase;
use crate::server::browser::{BrowserPool, DynBrowserDriver, chromium_driver::ChromiumBrowserDriver};
use crate::server::extraction::pure_fetch::default_client;
use crate::server::progress::JobRegistry;
use crate::server::services::cookie_services::CookieService;
use crate::server::services::opensubtitles_service::{DynSubtitleService, OpenSubtitlesSubtitleService};
use crate::server::subtitles::BlobCache;
use crate::server::utils::signature_utils::SignatureUtil;

use super::{
    cookie_services::DynCookieService, proxy_cache_services::DynProxyCacheService,
    rate_limit_services::DynRateLimitService,
};

/// DI container for the whole service - only Redis and a handful of in-process
/// handles, no database.
#[derive(Clone)]
pub struct AppServices {
    pub signature_util: Arc<SignatureUtil>,
    pub rate_limit: DynRateLimitService,
    pub cookies: DynCookieService,
    pub proxy_cache: DynProxyCacheService,
    pub subtitles: DynSubtitleService,
    pub blob_cache: BlobCache,
    pub browser_pool: Arc<BrowserPool>,
    pub job_registry: JobRegistry,
    pub http: reqwest::Client,
    pub redis: Arc<RedisDatabase>,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(redis_db: RedisDatabase, config: Arc<AppConfig>) -> Self {
        info!("starting app services (no database, redis + in-process state only)...");

        let signature_util = Arc::new(SignatureUtil::new(config.access_token_secret.clone()));
        let redis_repository = Arc::new(redis_db);

        let http = default_client();

        let rate_limit = Arc::new(super::rate_limit_services::EdgeRateLimitService::new(redis_repository.clone()))
            as DynRateLimitService;

        let cookies = Arc::new(CookieService::new(redis_repository.clone())) as DynCookieService;

        let proxy_cache = Arc::new(super::proxy_cache_services::ProxyCacheService::new(
            redis_repository.clone(),
            http.clone(),
            config.stream_user_agent.clone(),
        )) as DynProxyCacheService;

        let subtitles = Arc::new(OpenSubtitlesSubtitleService::new(&config)) as DynSubtitleService;

        let blob_cache = BlobCache::new();

        let browser_driver: DynBrowserDriver = Arc::new(ChromiumBrowserDriver::new(cookies.clone()));
        let browser_pool = Arc::new(BrowserPool::new(
            browser_driver,
            config.browser_pool_size,
            config.browser_tabs_per_process,
            Duration::from_secs(config.browser_acquire_timeout_secs),
        ));

        let job_registry = JobRegistry::new();

        info!("app services ready");

        Self {
            signature_util,
            rate_limit,
            cookies,
            proxy_cache,
            subtitles,
            blob_cache,
            browser_pool,
            job_registry,
            http,
            redis: redis_repository,
            config,
        }
    }
}
