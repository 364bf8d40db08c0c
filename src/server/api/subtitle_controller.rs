use axum::extract::{Extension, Query};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::debug;

use crate::server::dtos::subtitle_dto::{SubtitleDownloadQuery, SubtitlesListQuery, SubtitlesListResponse};
use crate::server::error::{AppResult, Error};
use crate::server::services::app_services::AppServices;
use crate::server::services::opensubtitles_service::SubtitleListParams;
use crate::server::subtitles::convert::{decode_text, decompress_gzip, is_gzip, srt_to_vtt};

pub struct SubtitleController;

impl SubtitleController {
    pub fn app() -> Router {
        Router::new()
            .route("/subtitles", get(Self::list))
            .route("/subtitles/download", get(Self::download))
    }

    /// `GET /api/subtitles` - looks up candidate tracks for an imdb id, sorted
    /// by quality score, without fetching or converting any subtitle bodies.
    async fn list(
        Extension(services): Extension<AppServices>,
        Query(query): Query<SubtitlesListQuery>,
    ) -> AppResult<Json<SubtitlesListResponse>> {
        let languages: Vec<String> = query
            .language_id
            .as_deref()
            .map(|raw| raw.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let subtitles = services
            .subtitles
            .list(SubtitleListParams {
                imdb_id: &query.imdb_id,
                languages: &languages,
                season: query.season,
                episode: query.episode,
            })
            .await?;

        debug!("subtitle list for {} returned {} entries", query.imdb_id, subtitles.len());

        Ok(Json(SubtitlesListResponse {
            success: true,
            total_count: subtitles.len(),
            language: if languages.is_empty() { "all".to_string() } else { languages.join(",") },
            subtitles,
            source: "opensubtitles",
        }))
    }

    /// `GET /api/subtitles/download` - fetches the raw track, gunzips if
    /// needed, converts SRT to WebVTT, and caches the converted bytes in the
    /// blob cache keyed by the source URL so repeat downloads of the same
    /// track (a seek-bar re-fetch, a second player instance) skip the origin
    /// round trip and the conversion work.
    async fn download(
        Extension(services): Extension<AppServices>,
        Query(query): Query<SubtitleDownloadQuery>,
    ) -> AppResult<Response> {
        if query.url.trim().is_empty() {
            return Err(Error::BadRequest("url is required".to_string()));
        }

        if let Some(cached) = services.blob_cache.get(&query.url).await {
            return Ok(vtt_response(cached));
        }

        let raw = services.subtitles.fetch_bytes(&query.url).await?;
        let raw = if is_gzip(&raw) {
            decompress_gzip(&raw).map_err(|e| Error::InternalServerErrorWithContext(format!("gunzip failed: {e}")))?
        } else {
            raw
        };

        let vtt = srt_to_vtt(&decode_text(&raw)).into_bytes();
        services.blob_cache.put(query.url.clone(), vtt.clone()).await;

        Ok(vtt_response(vtt))
    }
}

fn vtt_response(body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/vtt; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        body,
    )
        .into_response()
}
