use std::time::Duration;

use rand::Rng;

use crate::server::error::{AppResult, Error};
use crate::server::extraction::model::ExtractionErrorKind;
use crate::server::extraction::strategy::HopSignals;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HOP_TOTAL_TIMEOUT: Duration = Duration::from_secs(20);

pub struct HopResponse {
    pub status: u16,
    pub body: String,
}

/// does one GET with realistic browser headers, one retry with jittered backoff on
/// a transport-level failure. hop-specific headers (Referer/Origin masquerading as
/// the previous hop) are passed in by the caller so this stays transport-only.
pub async fn fetch_hop(
    client: &reqwest::Client,
    url: &str,
    referer: Option<&str>,
    user_agent: &str,
) -> AppResult<HopResponse> {
    let attempt = || async {
        let mut request = client
            .get(url)
            .timeout(HOP_TOTAL_TIMEOUT)
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9");

        if let Some(referer) = referer {
            request = request.header("Referer", referer);
        }

        request.send().await
    };

    let response = match attempt().await {
        Ok(response) => response,
        Err(first_err) => {
            let jitter_ms = rand::rng().random_range(250..=750);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            attempt().await.map_err(|_| {
                Error::Extraction(ExtractionErrorKind::Timeout {
                    stage: format!("fetch {url}: {first_err}"),
                })
            })?
        }
    };

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    Ok(HopResponse { status, body })
}

pub fn signals_from_response(response: &HopResponse, soft_timeout_elapsed: bool) -> HopSignals {
    let cloudflare_indicator = response.body.contains("cf-browser-verification")
        || response.body.contains("Checking your browser")
        || response.body.contains("cf_chl_opt");

    HopSignals {
        soft_timeout_elapsed,
        challenge_status: response.status == 403 || response.status == 503,
        body_len: response.body.len(),
        cloudflare_indicator,
    }
}

pub fn build_http_client(connect_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("reqwest client builder should not fail on static config")
}

pub fn default_client() -> reqwest::Client {
    build_http_client(CONNECT_TIMEOUT)
}
