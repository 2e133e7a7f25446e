use crate::errors::{AppError, Result};
use url::Url;
use std::path::Path;

/// Hosts that are accepted by the auto-add heuristic without further checks.
const VIDEO_DOMAINS: [&str; 9] = [
    "youtube.com", "youtu.be", "vimeo.com", "dailymotion.com",
    "twitch.tv", "tiktok.com", "instagram.com", "twitter.com", "x.com",
];

/// Minimum length of typed input before a debounced auto-add fires.
pub const AUTO_ADD_MIN_LEN: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("URL cannot be empty".to_string()));
        }

        let parsed_url = Url::parse(url)
            .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme: {}. Use http:// or https://",
                parsed_url.scheme()
            )));
        }

        if parsed_url.host_str().map_or(true, |h| h.is_empty()) {
            return Err(AppError::Validation("URL must have a host".to_string()));
        }

        Ok(())
    }

    /// Loose check used while the user is still typing.
    ///
    /// yt-dlp supports far more sites than the known list, so anything that
    /// looks like a dotted http(s) URL longer than 10 characters passes too.
    pub fn looks_like_video_url(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
            return false;
        }

        let lower = url.to_lowercase();
        if VIDEO_DOMAINS.iter().any(|domain| lower.contains(domain)) {
            return true;
        }

        url.contains('.') && url.len() > 10
    }

    /// Whether debounced input is complete enough to be queued automatically.
    pub fn is_auto_add_candidate(&self, url: &str) -> bool {
        self.looks_like_video_url(url) && url.trim().len() > AUTO_ADD_MIN_LEN
    }

    pub fn validate_output_dir(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(AppError::Validation("Output directory cannot be empty".to_string()));
        }

        // Check for null bytes
        if path.contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in output directory".to_string()));
        }

        let path = Path::new(path);
        if path.exists() && !path.is_dir() {
            return Err(AppError::Validation(format!("Not a directory: {}", path.display())));
        }

        Ok(())
    }
}
