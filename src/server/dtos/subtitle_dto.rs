use serde::{Deserialize, Serialize};

use crate::server::extraction::model::SubtitleRef;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitlesListQuery {
    pub imdb_id: String,
    pub language_id: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitlesListResponse {
    pub success: bool,
    pub subtitles: Vec<SubtitleRef>,
    pub total_count: usize,
    pub language: String,
    pub source: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleDownloadQuery {
    pub url: String,
}
