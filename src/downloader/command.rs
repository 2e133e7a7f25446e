// Argument vectors for yt-dlp download sessions.
//
// Quality values are either "best", a resolution token like "720p", or an
// opaque yt-dlp format selector that is passed through untouched.

use std::path::Path;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::utils::ensure_dir_exists;

/// Container that gets the preferred-container selector and a remux step.
const PREFERRED_CONTAINER: &str = "mp4";
/// Audio extension that muxes into the preferred container without re-encoding.
const PREFERRED_AUDIO_EXT: &str = "m4a";
/// yt-dlp output template; the placeholders are expanded by yt-dlp itself.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Quality selector for audio-only downloads. Also switches on audio extraction.
pub const AUDIO_ONLY_QUALITY: &str = "bestaudio/best";

#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuilder {
    default_output_dir: String,
    default_quality: String,
    target_format: String,
    audio_format: String,
}

impl CommandBuilder {
    pub fn new(default_output_dir: impl Into<String>, default_quality: impl Into<String>, target_format: impl Into<String>) -> Self {
        Self {
            default_output_dir: default_output_dir.into(),
            default_quality: default_quality.into(),
            target_format: target_format.into().to_lowercase(),
            audio_format: String::new(),
        }
    }

    /// Codec for audio extraction. Empty keeps whatever yt-dlp downloaded.
    pub fn with_audio_format(mut self, audio_format: impl Into<String>) -> Self {
        self.audio_format = audio_format.into().trim().to_lowercase();
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.download_dir, &config.quality, &config.format).with_audio_format(&config.audio_format)
    }

    /// Creates the output directory, then returns the argument vector.
    pub async fn build(&self, url: &str, output_dir: Option<&str>, quality: Option<&str>) -> Result<Vec<String>> {
        let dir = self.resolve_output_dir(output_dir);
        ensure_dir_exists(Path::new(dir)).await?;
        Ok(self.build_args(url, Some(dir), quality))
    }

    /// Argument vector without touching the file system.
    pub fn build_args(&self, url: &str, output_dir: Option<&str>, quality: Option<&str>) -> Vec<String> {
        let dir = self.resolve_output_dir(output_dir);
        let quality = quality
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&self.default_quality);

        let mut args = vec![
            "-o".to_string(),
            format!("{}/{}", dir.trim_end_matches(['/', '\\']), OUTPUT_TEMPLATE),
        ];

        if self.target_format == PREFERRED_CONTAINER {
            args.push("-f".to_string());
            args.push(preferred_container_selector(quality));
            args.push("--remux-video".to_string());
            args.push(PREFERRED_CONTAINER.to_string());
        } else if quality != "best" {
            args.push("-f".to_string());
            args.push(quality.to_string());
        }

        if quality == AUDIO_ONLY_QUALITY && !self.audio_format.is_empty() {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push(self.audio_format.clone());
        }

        args.push(url.to_string());
        args
    }

    fn resolve_output_dir<'a>(&'a self, output_dir: Option<&'a str>) -> &'a str {
        output_dir
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.default_output_dir)
    }
}

/// Parses a resolution token such as `720p` into its height bound.
pub fn parse_height(quality: &str) -> Option<u32> {
    let digits = quality.strip_suffix('p')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn preferred_container_selector(quality: &str) -> String {
    let height = match quality {
        "best" => None,
        q => match parse_height(q) {
            Some(h) => Some(h),
            None => return q.to_string(),
        },
    };

    let bound = height.map(|h| format!("[height<={}]", h)).unwrap_or_default();
    [
        format!("bv{bound}[ext={PREFERRED_CONTAINER}]+ba[ext={PREFERRED_AUDIO_EXT}]"),
        format!("b{bound}[ext={PREFERRED_CONTAINER}]"),
        format!("bv{bound}+ba"),
        format!("b{bound}"),
    ]
    .join("/")
}
