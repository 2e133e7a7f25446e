use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::downloader::manager::DownloadManager;
use crate::security::InputValidator;

/// Debounced enqueue for a URL input field.
///
/// Every change aborts the pending timer and arms a new one, so only the
/// text that stayed unchanged for the whole delay is considered. Text that
/// does not look like a complete video URL is ignored.
pub struct AutoAddScheduler {
    manager: Arc<DownloadManager>,
    validator: InputValidator,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoAddScheduler {
    pub fn new(manager: Arc<DownloadManager>, delay: Duration) -> Self {
        Self {
            manager,
            validator: InputValidator::new(),
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn from_config(manager: Arc<DownloadManager>, config: &AppConfig) -> Self {
        Self::new(manager, config.auto_add_delay())
    }

    pub fn on_input_changed(&self, text: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let manager = self.manager.clone();
        let validator = self.validator.clone();
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !validator.is_auto_add_candidate(&text) {
                debug!("Auto-add ignored incomplete input: {}", text);
                return;
            }
            match manager.enqueue(&text, None, None).await {
                Ok(Some(id)) => info!("Auto-added {} as {}", text, id),
                Ok(None) => debug!("Auto-add skipped duplicate {}", text),
                Err(e) => debug!("Auto-add rejected {}: {}", text, e),
            }
        }));
    }

    /// Drops the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take() {
            previous.abort();
        }
    }

    /// Waits for the pending timer to fire and its enqueue to finish.
    pub async fn wait_idle(&self) {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = pending {
            let _ = handle.await;
        }
    }
}

impl Drop for AutoAddScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
