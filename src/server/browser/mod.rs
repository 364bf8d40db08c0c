pub mod chromium_driver;
pub mod driver;
pub mod fingerprint;
pub mod null_driver;
pub mod pool;

pub use driver::{BrowserDriver, BrowserHandle, DynBrowserDriver, TabHandle};
pub use pool::{BrowserPool, BrowserPoolStats};
