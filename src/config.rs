use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub download_dir: String,
    pub quality: String,
    pub format: String,
    pub audio_format: String,
    pub binary_path: String,
    pub metadata_timeout_secs: u64,
    pub auto_fetch: bool,
    pub auto_add_delay_ms: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: "downloads".to_string(),
            quality: "best".to_string(),
            format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
            binary_path: default_binary_name().to_string(),
            metadata_timeout_secs: 10,
            auto_fetch: true,
            auto_add_delay_ms: 1000,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Platform-appropriate name of the yt-dlp executable.
pub fn default_binary_name() -> &'static str {
    if cfg!(windows) {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = AppConfig::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("ytdl-queue").join("config.json"))
    }

    pub fn metadata_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn auto_add_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.auto_add_delay_ms)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
