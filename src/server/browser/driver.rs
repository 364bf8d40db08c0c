use std::sync::Arc;
use std::time::Duration;

use crate::server::error::AppResult;
use crate::server::extraction::model::FingerprintProfile;

/// opaque handle to an acquired browser process. release happens by dropping this
/// through `BrowserDriver::release`, never implicitly, so every exit path
/// (success, escalation failure, cancellation) is an explicit release call.
#[derive(Debug, Clone)]
pub struct BrowserHandle {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct TabHandle {
    pub browser_id: String,
    pub tab_id: String,
}

/// the only impure actor in the extraction engine, and the seam used for testing -
/// everything above this trait is pure or already covered by unit tests against
/// canned fixtures.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn acquire(&self, fingerprint: &FingerprintProfile) -> AppResult<BrowserHandle>;

    async fn new_tab(&self, handle: &BrowserHandle, url: &str, referer: Option<&str>) -> AppResult<TabHandle>;

    async fn evaluate(&self, tab: &TabHandle, script: &str) -> AppResult<String>;

    /// polls network responses observed by the tab for one matching `predicate`,
    /// up to `timeout`. returns None if nothing matched in time.
    async fn wait_for_response(
        &self,
        tab: &TabHandle,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
        timeout: Duration,
    ) -> AppResult<Option<String>>;

    /// behavioral simulation only - never solves a captcha programmatically.
    /// returns true once the challenge appears resolved (by navigation succeeding
    /// past it), false if it gave up within the tab's own budget.
    async fn simulate_challenge_interaction(&self, tab: &TabHandle) -> AppResult<bool>;

    /// write-through point for the per-origin cookie jar: persists whatever
    /// cookies the tab accumulated for its origin, then drops the tab. Callers
    /// are expected to close every tab they open rather than relying on
    /// `release` to clean them up.
    async fn close_tab(&self, tab: &TabHandle) -> AppResult<()>;

    async fn release(&self, handle: BrowserHandle) -> AppResult<()>;
}

pub type DynBrowserDriver = Arc<dyn BrowserDriver>;
