#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis url for the connection, the only persistent store this service talks to
    #[clap(long, env)]
    pub redis_url: String,

    // this is needed to generate signatures, have it be anything secure
    // like 'openssl rand -base64 32'
    #[clap(long, env)]
    pub access_token_secret: String,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env)]
    pub cors_origin: String,

    // same as above but used for preview environments to stress or test the api.
    #[clap(long, env)]
    pub preview_cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // base url of the OpenSubtitles compatible rest api subtitle lookups are proxied through
    #[clap(long, env, default_value = "https://rest.opensubtitles.org")]
    pub opensubtitles_base_url: String,

    // api key / user agent string OpenSubtitles requires on every request, optional since the
    // subtitle endpoints degrade to empty results without one
    #[clap(long, env)]
    pub opensubtitles_api_key: Option<String>,

    // number of headless browser processes kept warm in the stealth pool
    #[clap(long, env, default_value = "4")]
    pub browser_pool_size: usize,

    // max tabs hosted per pooled browser process before a caller waits for one to free up
    #[clap(long, env, default_value = "8")]
    pub browser_tabs_per_process: usize,

    // seconds a caller waits for a free browser tab before failing the job as resource exhausted
    #[clap(long, env, default_value = "15")]
    pub browser_acquire_timeout_secs: u64,

    // comma separated allow list of hosts the stream proxy will forward requests to
    #[clap(long, env, default_value = "cloudnestra.com,vidsrc.xyz,embed.su,shadowlandschronicles.com")]
    pub proxy_allowed_hosts: String,

    // user agent sent on pure fetch hops and default browser fingerprints, kept realistic
    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
    )]
    pub stream_user_agent: String,

    // whether an unrecognized embed host falls back to a generic "click center of iframe"
    // heuristic instead of failing outright. off by default, see DESIGN.md.
    #[clap(long, env, default_value = "false")]
    pub enable_unknown_host_click_heuristic: bool,
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: "redis://localhost:6379".to_string(),
            access_token_secret: "default-access-secret".to_string(),
            cors_origin: "*".to_string(),
            preview_cors_origin: "*".to_string(),
            sentry_dsn: None,
            opensubtitles_base_url: "https://rest.opensubtitles.org".to_string(),
            opensubtitles_api_key: None,
            browser_pool_size: 4,
            browser_tabs_per_process: 8,
            browser_acquire_timeout_secs: 15,
            proxy_allowed_hosts: "cloudnestra.com,vidsrc.xyz,embed.su,shadowlandschronicles.com"
                .to_string(),
            stream_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            enable_unknown_host_click_heuristic: false,
        }
    }
}

impl AppConfig {
    pub fn proxy_allowed_hosts(&self) -> Vec<String> {
        self.proxy_allowed_hosts
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
