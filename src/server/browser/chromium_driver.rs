use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use futures::StreamExt;
use nanoid::nanoid;
use tokio::sync::Mutex;

use crate::server::browser::driver::{BrowserDriver, BrowserHandle, TabHandle};
use crate::server::browser::fingerprint::random_player_prefs;
use crate::server::error::{AppResult, Error};
use crate::server::extraction::model::{ExtractionErrorKind, FingerprintProfile};
use crate::server::services::cookie_services::{CookieService, CookieServiceTrait, DynCookieService};

/// `chromiumoxide`-backed implementation of the `BrowserDriver` contract. holds
/// one `Browser` handle per acquired process and a map of live pages keyed by tab
/// id - nothing above this module knows chromiumoxide exists.
pub struct ChromiumBrowserDriver {
    browsers: Mutex<HashMap<String, Browser>>,
    pages: Mutex<HashMap<String, Page>>,
    fingerprints: Mutex<HashMap<String, FingerprintProfile>>,
    cookies: DynCookieService,
}

/// splits a stored `"name=value; name2=value2"` cookie header back into pairs
/// so they can be replayed into the browser as individual cookies.
fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// JS injected before any page script runs (`Page::evaluate_on_new_document`),
/// so `navigator.webdriver` et al. read as patched from the very first paint
/// rather than being fixed up after the fact: consistent UA/platform/vendor/
/// languages, no automation tells, matching WebGL/timezone overrides, and
/// per-job randomized localStorage player prefs.
fn stealth_script(fingerprint: &FingerprintProfile, prefs: &crate::server::browser::fingerprint::PlayerPrefs) -> String {
    let languages_json = serde_json::to_string(&fingerprint.languages).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
            Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
            Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
            Object.defineProperty(navigator, 'vendor', {{ get: () => '{vendor}' }});
            Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
            Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {hw} }});
            Object.defineProperty(navigator, 'deviceMemory', {{ get: () => {mem} }});
            Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3] }});
            window.chrome = window.chrome || {{ runtime: {{}} }};

            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function (parameter) {{
                if (parameter === 37445) return '{webgl_vendor}';
                if (parameter === 37446) return '{webgl_renderer}';
                return getParameter.call(this, parameter);
            }};

            const dtf = Intl.DateTimeFormat;
            Intl.DateTimeFormat = function (...args) {{
                const inst = new dtf(...args);
                const resolved = inst.resolvedOptions.bind(inst);
                inst.resolvedOptions = () => ({{ ...resolved(), timeZone: '{timezone}' }});
                return inst;
            }};

            try {{
                localStorage.setItem('player.subtitleLanguage', '{subtitle_language}');
                localStorage.setItem('player.volume', '{volume}');
                localStorage.setItem('player.quality', '{quality}');
            }} catch (_e) {{ /* storage may be unavailable on opaque origins */ }}
        }})();"#,
        platform = fingerprint.platform,
        vendor = fingerprint.vendor,
        languages = languages_json,
        hw = fingerprint.hardware_concurrency,
        mem = fingerprint.device_memory,
        webgl_vendor = fingerprint.webgl_vendor,
        webgl_renderer = fingerprint.webgl_renderer,
        timezone = fingerprint.timezone,
        subtitle_language = prefs.subtitle_language,
        volume = prefs.volume,
        quality = prefs.quality,
    )
}

impl ChromiumBrowserDriver {
    pub fn new(cookies: DynCookieService) -> Self {
        Self {
            browsers: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            fingerprints: Mutex::new(HashMap::new()),
            cookies,
        }
    }

    async fn page_for(&self, tab: &TabHandle) -> AppResult<Page> {
        self.pages
            .lock()
            .await
            .get(&tab.tab_id)
            .cloned()
            .ok_or_else(|| Error::Extraction(ExtractionErrorKind::Internal))
    }

    /// restores the origin's cookie jar onto a freshly opened (still blank)
    /// page, before the real navigation fires.
    async fn restore_cookies(&self, page: &Page, url: &str) {
        let Some(origin) = CookieService::extract_domain(url) else {
            return;
        };
        let Some(header) = self.cookies.get_cookies(&origin).await else {
            return;
        };

        let params: Vec<CookieParam> = parse_cookie_header(&header)
            .into_iter()
            .filter_map(|(name, value)| CookieParam::builder().name(name).value(value).domain(origin.clone()).build().ok())
            .collect();

        if !params.is_empty()
            && let Err(e) = page.set_cookies(params).await
        {
            tracing::warn!("failed to restore cookie jar for {origin}: {e}");
        }
    }

    /// write-through: reads whatever cookies chromium now holds for the page's
    /// origin and stores them back in the jar, keyed the same way the pure-fetch
    /// cookie path (`CookieService`) keys its own entries.
    async fn persist_cookies(&self, page: &Page) {
        let Ok(Some(url)) = page.url().await else {
            return;
        };
        let Some(origin) = CookieService::extract_domain(&url) else {
            return;
        };

        match page.get_cookies().await {
            Ok(cookies) => {
                let as_headers: Vec<String> = cookies.into_iter().map(|c| format!("{}={}", c.name, c.value)).collect();
                self.cookies.store_cookies(&origin, &as_headers).await;
            }
            Err(e) => tracing::warn!("failed to read cookies for {origin}: {e}"),
        }
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ChromiumBrowserDriver {
    async fn acquire(&self, fingerprint: &FingerprintProfile) -> AppResult<BrowserHandle> {
        let config = BrowserConfig::builder()
            .user_agent(fingerprint.user_agent.clone())
            .window_size(fingerprint.screen.0, fingerprint.screen.1)
            .build()
            .map_err(|e| Error::InternalServerErrorWithContext(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            tracing::warn!("browser launch failed, treating as resource_exhausted: {e}");
            Error::Extraction(ExtractionErrorKind::ResourceExhausted)
        })?;

        // chromiumoxide requires the handler event loop to be polled independently
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let id = nanoid!();
        self.fingerprints.lock().await.insert(id.clone(), fingerprint.clone());
        self.browsers.lock().await.insert(id.clone(), browser);
        Ok(BrowserHandle { id })
    }

    async fn new_tab(&self, handle: &BrowserHandle, url: &str, referer: Option<&str>) -> AppResult<TabHandle> {
        let browsers = self.browsers.lock().await;
        let browser = browsers
            .get(&handle.id)
            .ok_or_else(|| Error::Extraction(ExtractionErrorKind::Internal))?;

        // open on a blank page first so the referer header (if any) is installed
        // via CDP before the real navigation fires - `new_page(url)` would have
        // already sent the request by the time headers could be attached.
        let page = browser.new_page("about:blank").await.map_err(|e| {
            tracing::warn!("failed to open tab: {e}");
            Error::Extraction(ExtractionErrorKind::NavigationError { hop: 0 })
        })?;

        if let Some(referer) = referer {
            let mut headers = HashMap::new();
            headers.insert("Referer".to_string(), referer.to_string());
            if let Err(e) = page.set_extra_http_headers(headers).await {
                tracing::warn!("failed to set referer header for {url}: {e}");
            }
        }

        self.restore_cookies(&page, url).await;

        if let Some(fingerprint) = self.fingerprints.lock().await.get(&handle.id) {
            let prefs = random_player_prefs();
            let script = stealth_script(fingerprint, &prefs);
            if let Err(e) = page.evaluate_on_new_document(script).await {
                tracing::warn!("failed to install stealth init script: {e}");
            }
        }

        page.goto(url).await.map_err(|e| {
            tracing::warn!("navigation to {url} failed: {e}");
            Error::Extraction(ExtractionErrorKind::NavigationError { hop: 0 })
        })?;

        let tab_id = nanoid!();
        self.pages.lock().await.insert(tab_id.clone(), page);

        Ok(TabHandle {
            browser_id: handle.id.clone(),
            tab_id,
        })
    }

    async fn evaluate(&self, tab: &TabHandle, script: &str) -> AppResult<String> {
        let page = self.page_for(tab).await?;
        let value = page
            .evaluate(script)
            .await
            .map_err(|e| Error::InternalServerErrorWithContext(format!("evaluate: {e}")))?;
        Ok(value.into_value::<String>().unwrap_or_default())
    }

    async fn wait_for_response(
        &self,
        tab: &TabHandle,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
        timeout: Duration,
    ) -> AppResult<Option<String>> {
        let page = self.page_for(tab).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }

            if let Ok(Some(current_url)) = page.url().await
                && predicate(&current_url)
            {
                return Ok(Some(current_url));
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn simulate_challenge_interaction(&self, tab: &TabHandle) -> AppResult<bool> {
        let page = self.page_for(tab).await?;

        // behavioral simulation: small mouse movement and a short wait, nothing
        // that attempts to recognize or solve the challenge content itself
        let _ = page
            .evaluate("window.scrollBy(0, 120)")
            .await
            .map_err(|e| Error::InternalServerErrorWithContext(format!("challenge sim: {e}")));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let current_url = page.url().await.unwrap_or_default().unwrap_or_default();
        Ok(!current_url.contains("cdn-cgi/challenge-platform"))
    }

    async fn close_tab(&self, tab: &TabHandle) -> AppResult<()> {
        let page = self.pages.lock().await.remove(&tab.tab_id);
        if let Some(page) = page {
            self.persist_cookies(&page).await;
            let _ = page.close().await;
        }
        Ok(())
    }

    async fn release(&self, handle: BrowserHandle) -> AppResult<()> {
        self.fingerprints.lock().await.remove(&handle.id);
        if let Some(mut browser) = self.browsers.lock().await.remove(&handle.id) {
            let _ = browser.close().await;
        }
        Ok(())
    }
}
