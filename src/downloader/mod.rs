pub mod auto_add;
pub mod command;
pub mod manager;
pub mod metadata;
pub mod process;
pub mod progress;
#[cfg(test)]
pub mod testing;

use serde::{Deserialize, Serialize};

/// Placeholder for descriptive fields that have not been resolved yet.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: String,
    pub url: String,
    pub quality: String,
    pub output_dir: String,
    pub status: DownloadStatus,
    pub progress: f32,
    pub title: String,
    pub channel: String,
    pub file_size: String,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Complete,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Failed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DownloadStatus::Queued => "Queued",
            DownloadStatus::Downloading => "Downloading",
            DownloadStatus::Complete => "Complete",
            DownloadStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

impl DownloadItem {
    pub fn new(id: String, url: String, quality: String, output_dir: String) -> Self {
        Self {
            id,
            url,
            quality,
            output_dir,
            status: DownloadStatus::Queued,
            progress: 0.0,
            title: UNKNOWN.to_string(),
            channel: UNKNOWN.to_string(),
            file_size: UNKNOWN.to_string(),
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn has_title(&self) -> bool {
        self.title != UNKNOWN
    }

    /// Fills descriptive fields that are still unresolved. Resolved fields are
    /// never replaced, and blank or "Unknown" values are ignored.
    pub fn fill_metadata(&mut self, title: Option<&str>, channel: Option<&str>, file_size: Option<&str>) -> bool {
        let mut changed = false;
        for (field, value) in [
            (&mut self.title, title),
            (&mut self.channel, channel),
            (&mut self.file_size, file_size),
        ] {
            if let Some(value) = value.map(str::trim) {
                if *field == UNKNOWN && !value.is_empty() && value != UNKNOWN {
                    *field = value.to_string();
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Receives notifications from a [`manager::DownloadManager`].
///
/// Callbacks run on the manager's processing task and must not block.
pub trait OutputObserver: Send + Sync {
    fn on_info(&self, message: &str);

    fn on_error(&self, message: &str);

    /// `percent` is the parsed value; `raw` is the untouched output line.
    fn on_progress(&self, percent: f32, raw: &str);

    /// Called with a snapshot whenever an item's status or metadata changes,
    /// including once when it reaches a terminal status.
    fn on_item_changed(&self, _item: &DownloadItem) {}
}
