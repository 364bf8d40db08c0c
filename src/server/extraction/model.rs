use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// which upstream embed chain to walk. Primary is vidsrc.xyz, Backup is embed.su -
/// auto-switch moves a job from Primary to Backup at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerChoice {
    Primary,
    Backup,
}

impl ServerChoice {
    pub fn opposite(self) -> Self {
        match self {
            ServerChoice::Primary => ServerChoice::Backup,
            ServerChoice::Backup => ServerChoice::Primary,
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primary" | "vidsrc" => Some(ServerChoice::Primary),
            "backup" | "embed.su" | "embedsu" => Some(ServerChoice::Backup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub server: ServerChoice,
    pub media_type: MediaType,
    pub content_id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ExtractionRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.content_id.trim().is_empty() {
            return Err("content_id must not be empty".into());
        }
        if self.media_type == MediaType::Tv && (self.season.is_none() || self.episode.is_none()) {
            return Err("mediaType=tv requires season and episode".into());
        }
        if let Some(season) = self.season
            && season == 0
        {
            return Err("season must be a positive integer".into());
        }
        if let Some(episode) = self.episode
            && episode == 0
        {
            return Err("episode must be a positive integer".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initializing,
    Connecting,
    Navigating,
    Bypassing,
    Extracting,
    Subtitles,
    Validating,
    Finalizing,
    Complete,
    Autoswitch,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamKind {
    Hls,
    Mp4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub stream_url: String,
    pub stream_kind: StreamKind,
    pub origin_host: String,
    pub requires_proxy: bool,
    pub subtitle_refs: Vec<SubtitleRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Vtt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleRef {
    pub language: String,
    pub language_name: String,
    pub download_url: String,
    pub format: SubtitleFormat,
    pub size_bytes: u64,
    pub rating: f64,
    pub download_count: u64,
    pub quality_score: f64,
    pub trusted: bool,
    pub hd: bool,
    pub hearing_impaired: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessedSubtitle {
    pub subtitle_ref: SubtitleRef,
    pub vtt_bytes: Vec<u8>,
    pub blob_handle: String,
    pub was_compressed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub request_id: String,
    pub request: ExtractionRequest,
    pub state: JobState,
    pub started_at: i64,
    pub phase: Phase,
    pub progress: u8,
    pub last_message: String,
    pub result: Option<StreamDescriptor>,
    pub error: Option<ExtractionErrorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionErrorPayload {
    pub kind: String,
    pub message: String,
    pub request_id: String,
    pub debug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub request_id: String,
    pub phase: Phase,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StreamDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionErrorPayload>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub platform: String,
    pub vendor: String,
    pub languages: Vec<String>,
    pub screen: (u32, u32),
    pub hardware_concurrency: u8,
    pub device_memory: u8,
    pub timezone: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}

/// extraction-specific failure kinds, nested in `Error::Extraction`. hop is which
/// link in the embed chain the failure occurred at, 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractionErrorKind {
    NavigationError { hop: u8 },
    ChallengeUnresolved,
    PatternNotFound { hop: u8 },
    Timeout { stage: String },
    ResourceExhausted,
    Canceled,
    Internal,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::NavigationError { .. } => "navigation_error",
            ExtractionErrorKind::ChallengeUnresolved => "challenge_unresolved",
            ExtractionErrorKind::PatternNotFound { .. } => "pattern_not_found",
            ExtractionErrorKind::Timeout { .. } => "timeout",
            ExtractionErrorKind::ResourceExhausted => "resource_exhausted",
            ExtractionErrorKind::Canceled => "canceled",
            ExtractionErrorKind::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ExtractionErrorKind::NavigationError { .. } => StatusCode::NOT_FOUND,
            ExtractionErrorKind::ChallengeUnresolved => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionErrorKind::PatternNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionErrorKind::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ExtractionErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ExtractionErrorKind::Canceled => StatusCode::BAD_REQUEST,
            ExtractionErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// pure function, no I/O. weights and clamp bounds match the documented formula
/// exactly - the clamp is applied once, to the full sum including the
/// hearing-impaired penalty, not twice (clamping before the penalty would
/// under-penalize any track whose unpenalized score already saturates at 100).
pub fn quality_score_with_hearing_impaired(
    rating: f64,
    download_count: u64,
    trusted: bool,
    hd: bool,
    format: SubtitleFormat,
    size_bytes: u64,
    hearing_impaired: bool,
) -> f64 {
    let mut score = 0.0;
    score += if trusted { 40.0 } else { 0.0 };
    score += if hd { 20.0 } else { 0.0 };
    score += if format == SubtitleFormat::Vtt { 15.0 } else { 0.0 };
    score += 0.0001 * download_count as f64;
    score += 2.0 * rating;
    if (5_000..=200_000).contains(&size_bytes) {
        score += 3.0;
    }
    score -= if hearing_impaired { 20.0 } else { 0.0 };
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_score_is_clamped_and_deterministic() {
        let a = quality_score_with_hearing_impaired(9.5, 100_000, true, true, SubtitleFormat::Vtt, 50_000, false);
        let b = quality_score_with_hearing_impaired(9.5, 100_000, true, true, SubtitleFormat::Vtt, 50_000, false);
        assert_eq!(a, b);
        assert!(a <= 100.0 && a >= 0.0);
    }

    #[test]
    fn hearing_impaired_penalizes_score() {
        let with_hi = quality_score_with_hearing_impaired(5.0, 10, false, false, SubtitleFormat::Srt, 1_000, true);
        let without_hi = quality_score_with_hearing_impaired(5.0, 10, false, false, SubtitleFormat::Srt, 1_000, false);
        assert!(with_hi < without_hi);
    }

    #[test]
    fn tv_media_type_requires_season_and_episode() {
        let req = ExtractionRequest {
            server: ServerChoice::Primary,
            media_type: MediaType::Tv,
            content_id: "tt123".into(),
            season: None,
            episode: None,
        };
        assert!(req.validate().is_err());
    }
}
