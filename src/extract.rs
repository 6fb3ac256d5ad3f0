//! Boundary to the external media-extraction tool.
//!
//! Handlers build an [`ExtractionConfig`] from the requested [`QualityTier`]
//! and hand it to an [`Extractor`]. The production implementation lives in
//! [`crate::ytdlp`]; tests substitute their own.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.facebook.com/";
const EXTRACTOR_RETRIES: u32 = 3;
const GENERIC_DETAIL_LIMIT: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityTier {
    #[default]
    Best,
    Hd,
    Sd,
    Low,
}

impl QualityTier {
    /// Unknown or missing values fall back to [`QualityTier::Best`].
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .map(|raw| raw.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("hd") => Self::Hd,
            Some("sd") => Self::Sd,
            Some("low") => Self::Low,
            _ => Self::Best,
        }
    }

    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::Best => None,
            Self::Hd => Some(720),
            Self::Sd => Some(480),
            Self::Low => Some(360),
        }
    }

    /// yt-dlp format selector: capped split streams, then a capped combined
    /// stream, then anything.
    pub fn format_selector(self) -> String {
        match self.max_height() {
            None => "best[ext=mp4]/best".to_string(),
            Some(height) => format!(
                "bestvideo[height<={height}]+bestaudio/best[height<={height}]/best"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub format: String,
    pub output_path: PathBuf,
    pub http_headers: Vec<(String, String)>,
    pub cookie_file: Option<PathBuf>,
    pub retries: u32,
    pub fragment_retries: u32,
    pub no_playlist: bool,
    pub merge_output_format: Option<String>,
    pub quiet: bool,
}

impl ExtractionConfig {
    pub fn for_tier(tier: QualityTier, output_path: &Path, cookie_file: Option<&Path>) -> Self {
        Self {
            format: tier.format_selector(),
            output_path: output_path.to_path_buf(),
            http_headers: vec![
                ("User-Agent".to_string(), USER_AGENT.to_string()),
                ("Referer".to_string(), REFERER.to_string()),
            ],
            cookie_file: cookie_file.map(Path::to_path_buf),
            retries: EXTRACTOR_RETRIES,
            fragment_retries: EXTRACTOR_RETRIES,
            no_playlist: true,
            merge_output_format: Some("mp4".to_string()),
            quiet: true,
        }
    }
}

/// What a successful extraction left on disk.
#[derive(Debug, Clone)]
pub struct ExtractedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extractor is not installed: {0}")]
    ToolMissing(String),
    #[error("video is private or unavailable: {0}")]
    PrivateOrUnavailable(String),
    #[error("video not found: {0}")]
    NotFound(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("extraction failed: {0}")]
    Failed(String),
    #[error("i/o failure during extraction: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    PrivateOrUnavailable,
    NotFound,
    Network,
    Generic,
}

impl ExtractionError {
    /// Classifies free-form extractor output. Only used for failures whose
    /// origin is opaque (the tool's stderr); everything else is constructed
    /// with a concrete variant.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        // Format selection misses are not access problems.
        if lower.contains("requested format") || lower.contains("format is not available") {
            return Self::Failed(message);
        }

        if [
            "private",
            "unavailable",
            "not available",
            "login required",
            "log in",
            "sign in",
            "cookies",
        ]
        .iter()
        .any(|needle| lower.contains(needle))
        {
            Self::PrivateOrUnavailable(message)
        } else if [
            "http error 404",
            "not found",
            "does not exist",
            "no video formats",
        ]
        .iter()
        .any(|needle| lower.contains(needle))
        {
            Self::NotFound(message)
        } else if [
            "timed out",
            "timeout",
            "connection",
            "network",
            "temporary failure in name resolution",
            "unreachable",
        ]
        .iter()
        .any(|needle| lower.contains(needle))
        {
            Self::Network(message)
        } else {
            Self::Failed(message)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PrivateOrUnavailable(_) => ErrorCategory::PrivateOrUnavailable,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Network(_) => ErrorCategory::Network,
            Self::ToolMissing(_) | Self::Failed(_) | Self::Io(_) => ErrorCategory::Generic,
        }
    }

    /// Message safe to show to the requester.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::PrivateOrUnavailable => {
                "This video is private or unavailable. If you can view it while logged in, \
                 upload your cookies file and try again."
                    .to_string()
            }
            ErrorCategory::NotFound => {
                "Video not found. Check that the link is correct.".to_string()
            }
            ErrorCategory::Network => {
                "A network error occurred while fetching the video. Please try again.".to_string()
            }
            ErrorCategory::Generic => {
                let detail = match self {
                    Self::ToolMissing(_) => "the download service is not available".to_string(),
                    Self::Failed(detail) => detail.clone(),
                    other => other.to_string(),
                };
                format!("Download failed: {}", truncate_chars(&detail, GENERIC_DETAIL_LIMIT))
            }
        }
    }
}

fn truncate_chars(value: &str, limit: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(limit).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetches `url` and writes exactly one media file to
    /// `config.output_path` (or a path the tool reports back).
    async fn extract(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractedMedia, ExtractionError>;
}
