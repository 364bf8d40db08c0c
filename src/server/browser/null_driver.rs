use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;

use crate::server::browser::driver::{BrowserDriver, BrowserHandle, TabHandle};
use crate::server::error::AppResult;
use crate::server::extraction::model::FingerprintProfile;

/// test double that never touches a real browser process. acquire/release just
/// mint and drop opaque ids; evaluate and wait_for_response return canned values
/// set at construction time. used by engine unit tests that exercise the phase
/// graph without chromiumoxide.
pub struct NullBrowserDriver {
    pub canned_response: Option<String>,
}

impl NullBrowserDriver {
    pub fn new(canned_response: Option<String>) -> Self {
        Self { canned_response }
    }
}

#[async_trait::async_trait]
impl BrowserDriver for NullBrowserDriver {
    async fn acquire(&self, _fingerprint: &FingerprintProfile) -> AppResult<BrowserHandle> {
        Ok(BrowserHandle { id: nanoid!() })
    }

    async fn new_tab(&self, handle: &BrowserHandle, _url: &str, _referer: Option<&str>) -> AppResult<TabHandle> {
        Ok(TabHandle {
            browser_id: handle.id.clone(),
            tab_id: nanoid!(),
        })
    }

    async fn evaluate(&self, _tab: &TabHandle, _script: &str) -> AppResult<String> {
        Ok(self.canned_response.clone().unwrap_or_default())
    }

    async fn wait_for_response(
        &self,
        _tab: &TabHandle,
        _predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
        _timeout: Duration,
    ) -> AppResult<Option<String>> {
        Ok(self.canned_response.clone())
    }

    async fn simulate_challenge_interaction(&self, _tab: &TabHandle) -> AppResult<bool> {
        Ok(true)
    }

    async fn close_tab(&self, _tab: &TabHandle) -> AppResult<()> {
        Ok(())
    }

    async fn release(&self, _handle: BrowserHandle) -> AppResult<()> {
        Ok(())
    }
}
