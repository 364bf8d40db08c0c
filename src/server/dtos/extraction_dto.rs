use serde::{Deserialize, Serialize};

use crate::server::error::Error;
use crate::server::extraction::model::{ExtractionRequest, MediaType, ServerChoice, StreamDescriptor, SubtitleRef};

/// query parameters for `GET /extract-stream-progress`, also reused by the
/// synchronous `POST /extract-stream` body (flattened) since both endpoints
/// accept the same extraction parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStreamParams {
    pub media_type: String,
    pub movie_id: String,
    pub server: Option<String>,
    pub season_id: Option<u32>,
    pub episode_id: Option<u32>,
}

impl ExtractStreamParams {
    /// turns the raw query/body shape into the engine's `ExtractionRequest`,
    /// surfacing any malformed field as a `BadRequest` before a job ever
    /// reaches the registry.
    pub fn into_extraction_request(self) -> Result<ExtractionRequest, Error> {
        let server = match self.server.as_deref() {
            None => ServerChoice::Primary,
            Some(raw) => ServerChoice::from_str_loose(raw).ok_or_else(|| Error::BadRequest(format!("unknown server '{raw}'")))?,
        };

        let media_type = match self.media_type.to_lowercase().as_str() {
            "movie" => MediaType::Movie,
            "tv" => MediaType::Tv,
            other => return Err(Error::BadRequest(format!("unknown mediaType '{other}'"))),
        };

        if self.movie_id.trim().is_empty() || self.movie_id.parse::<u64>().is_err() {
            return Err(Error::BadRequest("movieId must be a positive integer".to_string()));
        }

        let request = ExtractionRequest {
            server,
            media_type,
            content_id: self.movie_id,
            season: self.season_id,
            episode: self.episode_id,
        };

        request.validate().map_err(Error::BadRequest)?;

        Ok(request)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStreamBody {
    pub media_type: String,
    pub movie_id: String,
    pub server: Option<String>,
    pub season_id: Option<u32>,
    pub episode_id: Option<u32>,
}

impl From<ExtractStreamBody> for ExtractStreamParams {
    fn from(body: ExtractStreamBody) -> Self {
        ExtractStreamParams {
            media_type: body.media_type,
            movie_id: body.movie_id,
            server: body.server,
            season_id: body.season_id,
            episode_id: body.episode_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtitlesSummaryDto {
    pub found: usize,
    pub urls: Vec<SubtitleRef>,
}

/// terminal payload shape shared by the SSE `complete` event and the
/// synchronous `POST /extract-stream` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStreamResult {
    pub success: bool,
    pub stream_url: String,
    pub stream_kind: String,
    pub server: String,
    pub requires_proxy: bool,
    pub subtitles: SubtitlesSummaryDto,
    pub request_id: String,
}

impl ExtractStreamResult {
    pub fn from_descriptor(descriptor: StreamDescriptor, server: ServerChoice, request_id: String) -> Self {
        let subtitles = SubtitlesSummaryDto {
            found: descriptor.subtitle_refs.len(),
            urls: descriptor.subtitle_refs,
        };

        ExtractStreamResult {
            success: true,
            stream_url: descriptor.stream_url,
            stream_kind: format!("{:?}", descriptor.stream_kind).to_uppercase(),
            server: format!("{server:?}"),
            requires_proxy: descriptor.requires_proxy,
            subtitles,
            request_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStreamErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: String,
    pub request_id: String,
}
