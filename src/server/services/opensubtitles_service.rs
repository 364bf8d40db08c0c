use std::sync::Arc;

use mockall::automock;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};
use crate::server::extraction::model::{SubtitleFormat, SubtitleRef, quality_score_with_hearing_impaired};

pub type DynSubtitleService = Arc<dyn SubtitleServiceTrait + Send + Sync>;

pub struct SubtitleListParams<'a> {
    pub imdb_id: &'a str,
    pub languages: &'a [String],
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[automock]
#[async_trait::async_trait]
pub trait SubtitleServiceTrait {
    async fn list(&self, params: SubtitleListParams<'_>) -> AppResult<Vec<SubtitleRef>>;
    async fn fetch_bytes(&self, download_url: &str) -> AppResult<Vec<u8>>;
}

/// REST client for an OpenSubtitles-compatible API, shaped like `PpvsuService` so
/// it's mockable the same way via `mockall::automock` - tests drive the trait, not
/// this concrete type.
pub struct OpenSubtitlesSubtitleService {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenSubtitlesSubtitleService {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("static reqwest client config should not fail to build");

        Self {
            http,
            base_url: config.opensubtitles_base_url.clone(),
            api_key: config.opensubtitles_api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubtitleEntry {
    #[serde(rename = "SubLanguageID")]
    language: String,
    #[serde(rename = "LanguageName")]
    language_name: String,
    #[serde(rename = "SubDownloadLink")]
    download_url: String,
    #[serde(rename = "SubFormat")]
    format: Option<String>,
    #[serde(rename = "SubSize", default)]
    size_bytes: Option<String>,
    #[serde(rename = "SubRating", default)]
    rating: Option<String>,
    #[serde(rename = "SubDownloadsCnt", default)]
    download_count: Option<String>,
    #[serde(rename = "UserRank", default)]
    user_rank: Option<String>,
    #[serde(rename = "SubHD", default)]
    hd: Option<String>,
    #[serde(rename = "SubHearingImpaired", default)]
    hearing_impaired: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("1") | Some("true"))
}

impl From<RawSubtitleEntry> for SubtitleRef {
    fn from(raw: RawSubtitleEntry) -> Self {
        let format = match raw.format.as_deref() {
            Some("vtt") => SubtitleFormat::Vtt,
            _ => SubtitleFormat::Srt,
        };
        let size_bytes: u64 = raw.size_bytes.and_then(|s| s.parse().ok()).unwrap_or(0);
        let rating: f64 = raw.rating.and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let download_count: u64 = raw.download_count.and_then(|s| s.parse().ok()).unwrap_or(0);
        let trusted = matches!(raw.user_rank.as_deref(), Some("trusted") | Some("administrator"));
        let hd = flag(&raw.hd);
        let hearing_impaired = flag(&raw.hearing_impaired);

        let quality_score =
            quality_score_with_hearing_impaired(rating, download_count, trusted, hd, format, size_bytes, hearing_impaired);

        SubtitleRef {
            language: raw.language,
            language_name: raw.language_name,
            download_url: raw.download_url,
            format,
            size_bytes,
            rating,
            download_count,
            quality_score,
            trusted,
            hd,
            hearing_impaired,
        }
    }
}

#[async_trait::async_trait]
impl SubtitleServiceTrait for OpenSubtitlesSubtitleService {
    async fn list(&self, params: SubtitleListParams<'_>) -> AppResult<Vec<SubtitleRef>> {
        let languages = if params.languages.is_empty() {
            "all".to_string()
        } else {
            params.languages.join(",")
        };

        let mut path_segments = vec![
            "search".to_string(),
            format!("sublanguageid-{languages}"),
            format!("imdbid-{}", params.imdb_id.trim_start_matches("tt")),
        ];

        if let (Some(season), Some(episode)) = (params.season, params.episode) {
            path_segments.push(format!("season-{season}"));
            path_segments.push(format!("episode-{episode}"));
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path_segments.join("/"));

        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header("X-User-Agent", api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!("OpenSubtitles request failed: {e}");
            Error::OriginFailure(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(Error::OriginFailure(format!("opensubtitles returned {}", response.status())));
        }

        let raw: Vec<RawSubtitleEntry> = response.json().await.map_err(|e| {
            error!("OpenSubtitles response decode failed: {e}");
            Error::InternalServerErrorWithContext(format!("opensubtitles decode: {e}"))
        })?;

        let mut refs: Vec<SubtitleRef> = raw.into_iter().map(SubtitleRef::from).collect();

        // multi-language union, sorted by qualityScore desc then downloadCount desc
        // then the caller's language preference order
        refs.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.download_count.cmp(&a.download_count))
                .then_with(|| {
                    let a_rank = params.languages.iter().position(|l| l == &a.language).unwrap_or(usize::MAX);
                    let b_rank = params.languages.iter().position(|l| l == &b.language).unwrap_or(usize::MAX);
                    a_rank.cmp(&b_rank)
                })
        });

        debug!("OpenSubtitles returned {} entries for {}", refs.len(), params.imdb_id);
        Ok(refs)
    }

    async fn fetch_bytes(&self, download_url: &str) -> AppResult<Vec<u8>> {
        let response = self.http.get(download_url).send().await.map_err(|e| {
            error!("subtitle download failed: {e}");
            Error::OriginFailure(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(Error::OriginFailure(format!("subtitle download returned {}", response.status())));
        }

        Ok(response.bytes().await.map(|b| b.to_vec())?)
    }
}
