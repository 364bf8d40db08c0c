use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::server::browser::driver::TabHandle;
use crate::server::browser::pool::PooledBrowser;
use crate::server::error::{AppResult, Error};
use crate::server::extraction::hops::{
    parse_prorcp_page, parse_rcp_page, parse_shadowlands_page, parse_vidsrc_embed, resolve_hop_url,
};
use crate::server::extraction::hosts::{base_url_for, requires_proxy};
use crate::server::extraction::model::{
    ExtractionErrorKind, ExtractionErrorPayload, ExtractionRequest, MediaType, Phase, ServerChoice,
    StreamDescriptor, StreamKind, SubtitleRef,
};
use crate::server::extraction::pure_fetch::{fetch_hop, signals_from_response};
use crate::server::extraction::strategy::{Strategy, choose_strategy};
use crate::server::progress::JobHandle;
use crate::server::services::app_services::AppServices;
use crate::server::services::opensubtitles_service::SubtitleListParams;

const CHALLENGE_WAIT: Duration = Duration::from_secs(8);

/// drives a single job from `Initializing` to a terminal `Complete`/`Error`,
/// trying the requested server first. A hop-1 navigation 404 on the Primary
/// server auto-switches to the Backup server exactly once, under a brand new
/// job (new requestId) per spec - every other error kind is terminal on the
/// job it occurred on.
pub async fn run(job: JobHandle, request: ExtractionRequest, services: AppServices) {
    if let Err(message) = request.validate() {
        job.publish(terminal_error(&job, ExtractionErrorKind::Internal, message)).await;
        return;
    }

    job.publish(job.emit(Phase::Initializing, 0, "starting extraction")).await;

    let primary_result = attempt_server(&job, &request, &services, request.server).await;

    let (result, active_job) = match primary_result {
        Ok(descriptor) => (Ok(descriptor), job),
        Err(ExtractionErrorKind::NavigationError { hop: 1 }) => {
            let backup_server = request.server.opposite();
            warn!(
                "server {:?} returned a navigation 404 at hop 1, auto-switching to {:?}",
                request.server, backup_server
            );

            let backup_request_id = nanoid::nanoid!();
            job.publish(job.emit(
                Phase::Autoswitch,
                40,
                format!("primary server unavailable, retrying on {backup_server:?} (job {backup_request_id})"),
            ))
            .await;

            let backup_job = services.job_registry.create(backup_request_id).await;
            let (bridge_receiver, _snapshot, backup_token) = services
                .job_registry
                .subscribe(&backup_job.request_id)
                .await
                .expect("job was just created above");
            spawn_bridge(job.clone(), bridge_receiver, backup_token);

            let mut backup_request = request.clone();
            backup_request.server = backup_server;
            let backup_result = attempt_server(&backup_job, &backup_request, &services, backup_server).await;
            (backup_result, backup_job)
        }
        Err(kind) => (Err(kind), job),
    };

    match result {
        Ok(descriptor) => {
            let event = crate::server::extraction::model::ProgressEvent {
                request_id: active_job.request_id.clone(),
                phase: Phase::Complete,
                progress: 100,
                message: "extraction complete".to_string(),
                result: Some(descriptor),
                error: None,
            };
            active_job.publish(event).await;
        }
        Err(kind) => {
            active_job.publish(terminal_error(&active_job, kind, "extraction failed")).await;
        }
    }
}

/// after an auto-switch, mirrors every event published on the new (backup)
/// job onto the original job's broadcast channel too, so a caller already
/// attached to the original requestId sees the backup attempt's phases and
/// its terminal event without reconnecting. The backup job remains its own
/// independently addressable entry in the registry for a caller that does
/// reconnect with the new requestId. A disconnect of the original caller
/// (signaled through its own cancellation token) cancels the backup job's
/// token too, so the backup attempt is interrupted rather than left running
/// for a caller that is no longer listening.
fn spawn_bridge(
    old_job: JobHandle,
    mut new_job_events: tokio::sync::broadcast::Receiver<crate::server::extraction::model::ProgressEvent>,
    backup_token: tokio_util::sync::CancellationToken,
) {
    let old_token = old_job.cancellation_token();
    tokio::spawn(async move {
        let mut cancel_forwarded = false;
        loop {
            tokio::select! {
                _ = old_token.cancelled(), if !cancel_forwarded => {
                    backup_token.cancel();
                    cancel_forwarded = true;
                }
                received = new_job_events.recv() => {
                    match received {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            old_job.publish(event).await;
                            if terminal {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });
}

fn terminal_error(
    job: &JobHandle,
    kind: ExtractionErrorKind,
    message: impl Into<String>,
) -> crate::server::extraction::model::ProgressEvent {
    let message = message.into();
    crate::server::extraction::model::ProgressEvent {
        request_id: job.request_id.clone(),
        phase: Phase::Error,
        progress: 100,
        message: message.clone(),
        result: None,
        error: Some(ExtractionErrorPayload {
            kind: kind.as_str().to_string(),
            message,
            request_id: job.request_id.clone(),
            debug: Some(format!("{kind:?}")),
        }),
    }
}

/// per-attempt state: shares one HTTP client, escalates pure-fetch to a pooled
/// browser on the first hop that asks for it, and keeps that browser around for
/// the rest of the hops rather than re-acquiring per hop.
struct HopWalker<'a> {
    services: &'a AppServices,
    strategy: Strategy,
    browser: Option<PooledBrowser>,
}

impl<'a> HopWalker<'a> {
    fn new(services: &'a AppServices) -> Self {
        Self { services, strategy: Strategy::PureFetch, browser: None }
    }

    async fn fetch(&mut self, url: &str, referer: Option<&str>) -> AppResult<String> {
        if self.strategy == Strategy::PureFetch {
            let response = fetch_hop(&self.services.http, url, referer, &self.services.config.stream_user_agent).await?;
            let signals = signals_from_response(&response, false);
            let escalated = choose_strategy(self.strategy, signals);

            if escalated == Strategy::Browser {
                debug!("escalating to browser strategy fetching {url}");
                self.strategy = Strategy::Browser;
                return self.fetch_via_browser(url, referer).await;
            }

            if response.status >= 400 {
                return Err(Error::Extraction(ExtractionErrorKind::NavigationError { hop: 0 }));
            }

            Ok(response.body)
        } else {
            self.fetch_via_browser(url, referer).await
        }
    }

    async fn fetch_via_browser(&mut self, url: &str, referer: Option<&str>) -> AppResult<String> {
        if self.browser.is_none() {
            self.browser = Some(self.services.browser_pool.acquire().await?);
        }
        let browser = self.browser.as_ref().expect("just populated above");

        let tab = browser.new_tab(url, referer).await?;

        let result = Self::read_tab(browser, &tab).await;
        if let Err(e) = browser.close_tab(&tab).await {
            warn!("failed to close tab and write through its cookie jar: {e}");
        }
        result
    }

    async fn read_tab(browser: &PooledBrowser, tab: &TabHandle) -> AppResult<String> {
        let html = browser.evaluate(tab, "document.documentElement.outerHTML").await?;
        let looks_challenged = html.contains("cf-browser-verification") || html.contains("Just a moment");

        if looks_challenged {
            let resolved = browser.simulate_challenge_interaction(tab).await?;
            if !resolved {
                return Err(Error::Extraction(ExtractionErrorKind::ChallengeUnresolved));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            return browser.evaluate(tab, "document.documentElement.outerHTML").await;
        }

        let _ = browser.wait_for_response(tab, Arc::new(|_: &str| true), CHALLENGE_WAIT).await;
        Ok(html)
    }

    /// last-resort fallback for an embed host whose markup doesn't match any
    /// known hop pattern: reopens the page in the browser, dispatches a
    /// synthetic click at the viewport center (the conventional spot a custom
    /// player puts its "play" overlay), waits briefly for it to react, then
    /// re-reads the DOM. Only ever tried once per hop, and only when
    /// `enable_unknown_host_click_heuristic` is on (see DESIGN.md). Forces the
    /// browser strategy since there's nothing to click over a bare HTTP fetch.
    async fn click_heuristic_retry(&mut self, url: &str, referer: Option<&str>) -> AppResult<String> {
        self.strategy = Strategy::Browser;
        if self.browser.is_none() {
            self.browser = Some(self.services.browser_pool.acquire().await?);
        }
        let browser = self.browser.as_ref().expect("just populated above");

        let tab = browser.new_tab(url, referer).await?;
        let _ = browser
            .evaluate(
                &tab,
                "(() => { const el = document.elementFromPoint(window.innerWidth/2, window.innerHeight/2); \
                 if (el) { el.dispatchEvent(new MouseEvent('click', {bubbles: true})); } })()",
            )
            .await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let result = browser.evaluate(&tab, "document.documentElement.outerHTML").await;
        if let Err(e) = browser.close_tab(&tab).await {
            warn!("failed to close tab and write through its cookie jar: {e}");
        }
        result
    }

    async fn finish(self) {
        if let Some(browser) = self.browser
            && let Err(e) = browser.release().await
        {
            warn!("failed to release browser: {e}");
        }
    }
}

/// races a hop fetch against the job's cancellation token so a caller
/// disconnect interrupts an in-flight fetch instead of waiting out its own
/// timeout - `Err(())` means the token fired first, `Ok(_)` forwards whatever
/// the fetch itself produced.
async fn race_cancel<F>(job: &JobHandle, fut: F) -> Result<AppResult<String>, ()>
where
    F: std::future::Future<Output = AppResult<String>>,
{
    tokio::select! {
        biased;
        _ = job.cancellation_token().cancelled() => Err(()),
        result = fut => Ok(result),
    }
}

fn embed_path(request: &ExtractionRequest) -> String {
    match request.media_type {
        MediaType::Movie => format!("/embed/movie/{}", request.content_id),
        MediaType::Tv => format!(
            "/embed/tv/{}/{}/{}",
            request.content_id,
            request.season.unwrap_or(1),
            request.episode.unwrap_or(1)
        ),
    }
}

async fn attempt_server(
    job: &JobHandle,
    request: &ExtractionRequest,
    services: &AppServices,
    server: ServerChoice,
) -> Result<StreamDescriptor, ExtractionErrorKind> {
    if job.cancellation_token().is_cancelled() {
        return Err(ExtractionErrorKind::Canceled);
    }

    job.publish(job.emit(Phase::Connecting, 10, format!("connecting to {server:?}"))).await;

    let embed_url = format!("{}{}", base_url_for(server), embed_path(request));
    let mut walker = HopWalker::new(services);

    job.publish(job.emit(Phase::Navigating, 20, "fetching embed page")).await;
    let embed_html = match race_cancel(job, walker.fetch(&embed_url, None)).await {
        Err(()) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::Canceled);
        }
        Ok(Ok(html)) => html,
        Ok(Err(_)) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::NavigationError { hop: 1 });
        }
    };

    let rcp_path = match parse_vidsrc_embed(&embed_html) {
        Some(path) => path,
        None if services.config.enable_unknown_host_click_heuristic => {
            let retried_html = match walker.click_heuristic_retry(&embed_url, None).await {
                Ok(html) => html,
                Err(_) => {
                    walker.finish().await;
                    return Err(ExtractionErrorKind::PatternNotFound { hop: 1 });
                }
            };
            match parse_vidsrc_embed(&retried_html) {
                Some(path) => path,
                None => {
                    walker.finish().await;
                    return Err(ExtractionErrorKind::PatternNotFound { hop: 1 });
                }
            }
        }
        None => {
            walker.finish().await;
            return Err(ExtractionErrorKind::PatternNotFound { hop: 1 });
        }
    };
    let Some(rcp_url) = resolve_hop_url(&embed_url, &rcp_path) else {
        walker.finish().await;
        return Err(ExtractionErrorKind::PatternNotFound { hop: 1 });
    };

    job.publish(job.emit(Phase::Bypassing, 35, "walking cloudnestra hop")).await;
    let rcp_html = match race_cancel(job, walker.fetch(&rcp_url, Some(&embed_url))).await {
        Err(()) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::Canceled);
        }
        Ok(Ok(html)) => html,
        Ok(Err(_)) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::NavigationError { hop: 2 });
        }
    };

    let Some(prorcp_path) = parse_rcp_page(&rcp_html) else {
        walker.finish().await;
        return Err(ExtractionErrorKind::PatternNotFound { hop: 2 });
    };
    let Some(prorcp_url) = resolve_hop_url(&rcp_url, &prorcp_path) else {
        walker.finish().await;
        return Err(ExtractionErrorKind::PatternNotFound { hop: 2 });
    };

    job.publish(job.emit(Phase::Extracting, 55, "walking prorcp hop")).await;
    let prorcp_html = match race_cancel(job, walker.fetch(&prorcp_url, Some(&rcp_url))).await {
        Err(()) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::Canceled);
        }
        Ok(Ok(html)) => html,
        Ok(Err(_)) => {
            walker.finish().await;
            return Err(ExtractionErrorKind::NavigationError { hop: 3 });
        }
    };

    let stream_url = match parse_prorcp_page(&prorcp_html) {
        Some(candidate) if candidate.contains(".m3u8") => candidate,
        Some(shadowlands_path) => {
            let Some(shadowlands_url) = resolve_hop_url(&prorcp_url, &shadowlands_path) else {
                walker.finish().await;
                return Err(ExtractionErrorKind::PatternNotFound { hop: 3 });
            };

            let shadowlands_html = match race_cancel(job, walker.fetch(&shadowlands_url, Some(&prorcp_url))).await {
                Err(()) => {
                    walker.finish().await;
                    return Err(ExtractionErrorKind::Canceled);
                }
                Ok(Ok(html)) => html,
                Ok(Err(_)) => {
                    walker.finish().await;
                    return Err(ExtractionErrorKind::NavigationError { hop: 4 });
                }
            };

            match parse_shadowlands_page(&shadowlands_html) {
                Some(m3u8) => m3u8,
                None => {
                    walker.finish().await;
                    return Err(ExtractionErrorKind::PatternNotFound { hop: 4 });
                }
            }
        }
        None => {
            walker.finish().await;
            return Err(ExtractionErrorKind::PatternNotFound { hop: 3 });
        }
    };

    walker.finish().await;

    if job.cancellation_token().is_cancelled() {
        return Err(ExtractionErrorKind::Canceled);
    }

    job.publish(job.emit(Phase::Subtitles, 75, "fetching subtitles")).await;
    let subtitle_refs = fetch_subtitles(job, request, services).await;

    job.publish(job.emit(Phase::Validating, 90, "validating manifest")).await;
    if let Err(kind) = validate_manifest(services, &stream_url).await {
        return Err(kind);
    }

    job.publish(job.emit(Phase::Finalizing, 95, "finalizing stream descriptor")).await;

    let origin_host = url::Url::parse(&stream_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();

    Ok(StreamDescriptor {
        stream_url,
        stream_kind: StreamKind::Hls,
        requires_proxy: requires_proxy(&origin_host),
        origin_host,
        subtitle_refs,
    })
}

async fn validate_manifest(services: &AppServices, stream_url: &str) -> Result<(), ExtractionErrorKind> {
    match fetch_hop(&services.http, stream_url, None, &services.config.stream_user_agent).await {
        Ok(response) if response.status < 400 && response.body.contains("#EXT") => Ok(()),
        Ok(_) => Err(ExtractionErrorKind::PatternNotFound { hop: 5 }),
        Err(_) => Err(ExtractionErrorKind::Timeout { stage: "validate".to_string() }),
    }
}

/// best-effort: a subtitle lookup failure never fails the whole job, it just
/// means the descriptor ships with an empty `subtitle_refs`.
async fn fetch_subtitles(job: &JobHandle, request: &ExtractionRequest, services: &AppServices) -> Vec<SubtitleRef> {
    let params = SubtitleListParams {
        imdb_id: &request.content_id,
        languages: &[],
        season: request.season,
        episode: request.episode,
    };

    match services.subtitles.list(params).await {
        Ok(refs) => {
            info!("found {} subtitle tracks for job {}", refs.len(), job.request_id);
            refs
        }
        Err(e) => {
            warn!("subtitle lookup failed for job {}: {e}", job.request_id);
            Vec::new()
        }
    }
}

/// bridges the progress bus to the job registry spawn point used by the HTTP
/// layer - kept separate from `run` so tests can drive `run` directly against a
/// `NullBrowserDriver`-backed `BrowserPool` without going through tokio::spawn.
pub fn spawn(job: JobHandle, request: ExtractionRequest, services: AppServices) {
    tokio::spawn(async move { run(job, request, services).await });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::extraction::model::MediaType;
    use crate::server::progress::JobRegistry;

    fn test_request() -> ExtractionRequest {
        ExtractionRequest {
            server: ServerChoice::Primary,
            media_type: MediaType::Movie,
            content_id: "tt1234567".to_string(),
            season: None,
            episode: None,
        }
    }

    #[test]
    fn embed_path_for_movie_has_no_season_or_episode() {
        let request = test_request();
        assert_eq!(embed_path(&request), "/embed/movie/tt1234567");
    }

    #[test]
    fn embed_path_for_tv_includes_season_and_episode() {
        let mut request = test_request();
        request.media_type = MediaType::Tv;
        request.season = Some(2);
        request.episode = Some(5);
        assert_eq!(embed_path(&request), "/embed/tv/tt1234567/2/5");
    }

    #[tokio::test]
    async fn invalid_request_publishes_a_terminal_error_without_touching_the_network() {
        let registry = JobRegistry::new();
        let job = registry.create("job-test".to_string()).await;
        let (mut receiver, _snapshot, _token) = registry.subscribe("job-test").await.unwrap();

        let mut request = test_request();
        request.media_type = MediaType::Tv;
        request.season = None;
        request.episode = None;

        let event = receiver.recv();
        job.publish(job.emit(Phase::Initializing, 0, "starting extraction")).await;
        assert_eq!(event.await.unwrap().phase, Phase::Initializing);

        let error = terminal_error(&job, ExtractionErrorKind::Internal, "mediaType=tv requires season and episode");
        assert_eq!(error.phase, Phase::Error);
        assert!(error.error.is_some());
    }
}
