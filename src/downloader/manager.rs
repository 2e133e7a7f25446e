use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::downloader::command::CommandBuilder;
use crate::downloader::metadata::MetadataFetcher;
use crate::downloader::process::ProcessRunner;
use crate::downloader::progress::{classify, infer_title, LineKind};
use crate::downloader::{DownloadItem, DownloadStatus, OutputObserver};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::generate_download_id;

#[derive(Default)]
struct QueueState {
    items: Vec<DownloadItem>,
    active: Option<String>,
    running: bool,
}

/// Outcome counts of one `start_all` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Owns the download queue and drives one yt-dlp session at a time.
pub struct DownloadManager {
    state: Arc<Mutex<QueueState>>,
    runner: Arc<dyn ProcessRunner>,
    fetcher: MetadataFetcher,
    builder: CommandBuilder,
    observer: Arc<dyn OutputObserver>,
    validator: InputValidator,
    default_quality: String,
    default_output_dir: String,
    metadata_timeout: Duration,
    prefetch: bool,
    fetches: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadManager {
    pub fn new(config: &AppConfig, runner: Arc<dyn ProcessRunner>, observer: Arc<dyn OutputObserver>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            fetcher: MetadataFetcher::new(runner.clone()),
            runner,
            builder: CommandBuilder::from_config(config),
            observer,
            validator: InputValidator::new(),
            default_quality: config.quality.clone(),
            default_output_dir: config.download_dir.clone(),
            metadata_timeout: config.metadata_timeout(),
            prefetch: config.auto_fetch,
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metadata_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch = enabled;
        self
    }

    /// Appends a URL to the queue.
    ///
    /// Returns `Ok(None)` when the URL is already queued. Malformed input is
    /// rejected before the queue is touched.
    pub async fn enqueue(&self, url: &str, quality: Option<&str>, output_dir: Option<&str>) -> Result<Option<String>> {
        self.validator.validate_url(url)?;
        if let Some(dir) = output_dir {
            self.validator.validate_output_dir(dir)?;
        }
        let url = url.trim().to_string();

        let (id, queued) = {
            let mut state = self.state.lock().await;
            if state.items.iter().any(|item| item.url == url) {
                debug!("Already queued: {}", url);
                return Ok(None);
            }

            let item = DownloadItem::new(
                generate_download_id(),
                url.clone(),
                quality.unwrap_or(&self.default_quality).to_string(),
                output_dir.unwrap_or(&self.default_output_dir).to_string(),
            );
            let id = item.id.clone();
            state.items.push(item);
            (id, state.items.len())
        };

        info!("Queued {} as {}", url, id);
        if self.prefetch {
            self.observer
                .on_info(&format!("Fetching video info... ({} items in queue)", queued));
            self.schedule_metadata(id.clone(), url).await;
        } else {
            self.observer.on_info(&format!("Added to queue ({} items in queue)", queued));
        }

        Ok(Some(id))
    }

    async fn schedule_metadata(&self, id: String, url: String) {
        let state = self.state.clone();
        let fetcher = self.fetcher.clone();
        let observer = self.observer.clone();
        let limit = self.metadata_timeout;

        let handle = tokio::spawn(async move {
            let meta = match fetcher.fetch(&url, limit).await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Metadata fetch failed for {}: {}", url, e);
                    return;
                }
            };

            let updated = {
                let mut state = state.lock().await;
                state.items.iter_mut().find(|item| item.id == id).and_then(|item| {
                    item.fill_metadata(meta.title.as_deref(), meta.channel.as_deref(), meta.file_size.as_deref())
                        .then(|| item.clone())
                })
            };
            if let Some(item) = updated {
                observer.on_item_changed(&item);
            }
        });

        let mut fetches = self.fetches.lock().await;
        fetches.retain(|h| !h.is_finished());
        fetches.push(handle);
    }

    /// Waits for every metadata fetch scheduled so far.
    pub async fn settle_metadata(&self) {
        let pending = std::mem::take(&mut *self.fetches.lock().await);
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Metadata task ended abnormally: {}", e);
            }
        }
    }

    /// Processes queued items in insertion order until none are left.
    ///
    /// Does nothing when the queue has no queued items or a run is already
    /// in progress.
    pub async fn start_all(&self) -> Result<RunSummary> {
        {
            let mut state = self.state.lock().await;
            let has_work = state.items.iter().any(|item| item.status == DownloadStatus::Queued);
            if state.running || state.active.is_some() || !has_work {
                return Ok(RunSummary::default());
            }
            state.running = true;
        }

        let mut summary = RunSummary::default();
        while let Some(item) = self.claim_next().await {
            let outcome = self.run_session(&item).await;
            if outcome.is_ok() {
                summary.completed += 1;
            } else {
                summary.failed += 1;
            }
            self.finish(&item, outcome).await;
        }

        info!("Run finished: {} completed, {} failed", summary.completed, summary.failed);
        self.observer.on_info("All downloads completed");
        self.observer.on_progress(0.0, "");
        Ok(summary)
    }

    /// Runs [`start_all`](Self::start_all) on its own task.
    pub fn spawn_start_all(self: &Arc<Self>) -> JoinHandle<Result<RunSummary>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.start_all().await })
    }

    /// Claims the oldest queued item. Clears `running` under the same lock
    /// when there is none, so an item enqueued afterwards starts a new run.
    async fn claim_next(&self) -> Option<DownloadItem> {
        let claimed = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(item) = state
                .items
                .iter_mut()
                .find(|item| item.status == DownloadStatus::Queued)
            else {
                state.running = false;
                return None;
            };
            item.status = DownloadStatus::Downloading;
            item.progress = 0.0;
            item.started_at = Some(chrono::Utc::now());
            let snapshot = item.clone();
            state.active = Some(snapshot.id.clone());
            snapshot
        };

        self.observer.on_item_changed(&claimed);
        Some(claimed)
    }

    async fn run_session(&self, item: &DownloadItem) -> Result<()> {
        info!("Starting download {} ({})", item.id, item.url);
        self.observer.on_info(&format!("Downloading: {}", item.url));

        let args = self
            .builder
            .build(&item.url, Some(&item.output_dir), Some(&item.quality))
            .await?;
        debug!("{} {:?}", self.runner.program(), args);
        let mut session = self.runner.spawn(&args).await?;

        let mut context = ErrorContext::default();
        let mut title_pending = !item.has_title();
        while let Some(line) = session.next_line().await {
            debug!("[{}] {}", item.id, line.text);
            context.observe(&line.text);

            match classify(&line.text) {
                LineKind::Progress(percent) => {
                    self.update_progress(&item.id, percent).await;
                    self.observer.on_progress(percent, &line.text);
                }
                LineKind::Info(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.observer.on_info(&text);
                    if title_pending {
                        if let Some(title) = infer_title(&text) {
                            title_pending = !self.apply_title(&item.id, &title).await;
                        }
                    }
                }
            }
        }

        match session.wait().await? {
            0 => Ok(()),
            code => Err(AppError::Process {
                code,
                context: context.into_message(code),
            }),
        }
    }

    async fn update_progress(&self, id: &str, percent: f32) {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
            item.progress = item.progress.max(percent);
        }
    }

    /// Returns true once the item has a title, whoever set it.
    async fn apply_title(&self, id: &str, title: &str) -> bool {
        let (resolved, changed) = {
            let mut state = self.state.lock().await;
            match state.items.iter_mut().find(|item| item.id == id) {
                Some(item) => {
                    let changed = item.fill_metadata(Some(title), None, None);
                    (item.has_title(), changed.then(|| item.clone()))
                }
                None => (true, None),
            }
        };

        if let Some(item) = changed {
            debug!("Title inferred for {}: {}", item.id, item.title);
            self.observer.on_item_changed(&item);
        }
        resolved
    }

    async fn finish(&self, claimed: &DownloadItem, outcome: Result<()>) {
        let finished = {
            let mut state = self.state.lock().await;
            state.active = None;
            state.items.iter_mut().find(|item| item.id == claimed.id).map(|item| {
                match &outcome {
                    Ok(()) => {
                        item.status = DownloadStatus::Complete;
                        item.progress = 100.0;
                        item.completed_at = Some(chrono::Utc::now());
                    }
                    Err(e) => {
                        item.status = DownloadStatus::Failed;
                        item.error_message = Some(e.to_string());
                    }
                }
                item.clone()
            })
        };

        match &outcome {
            Ok(()) => info!("Download {} complete", claimed.id),
            Err(e) => {
                error!("Download {} failed: {}", claimed.id, e);
                self.observer.on_error(&format!("Download failed: {}", e));
            }
        }
        if let Some(item) = finished {
            self.observer.on_item_changed(&item);
        }
    }

    /// Removes a queued or finished item. The active item cannot be removed.
    pub async fn remove(&self, id: &str) -> Result<DownloadItem> {
        let mut state = self.state.lock().await;
        if state.active.as_deref() == Some(id) {
            return Err(AppError::ItemActive(id.to_string()));
        }
        let index = state
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound(format!("No queued item with id {}", id)))?;
        Ok(state.items.remove(index))
    }

    /// Empties the queue. Refused while a download is running.
    pub async fn clear_queue(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        if let Some(active) = &state.active {
            return Err(AppError::QueueBusy(format!("{} is downloading", active)));
        }
        let removed = state.items.len();
        state.items.clear();
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Vec<DownloadItem> {
        self.state.lock().await.items.clone()
    }

    pub async fn get(&self, id: &str) -> Option<DownloadItem> {
        let state = self.state.lock().await;
        state.items.iter().find(|item| item.id == id).cloned()
    }

    pub async fn find_by_url(&self, url: &str) -> Option<DownloadItem> {
        let url = url.trim();
        let state = self.state.lock().await;
        state.items.iter().find(|item| item.url == url).cloned()
    }

    pub async fn active_item(&self) -> Option<DownloadItem> {
        let state = self.state.lock().await;
        let active = state.active.as_deref()?;
        state.items.iter().find(|item| item.id == active).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .items
            .iter()
            .filter(|item| item.status == DownloadStatus::Queued)
            .count()
    }
}

/// Keeps the most useful line for a failure message.
#[derive(Default)]
struct ErrorContext {
    last_error: Option<String>,
    last_line: Option<String>,
}

impl ErrorContext {
    fn observe(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("ERROR:") {
            self.last_error = Some(line.to_string());
        }
        self.last_line = Some(line.to_string());
    }

    fn into_message(self, code: i32) -> String {
        self.last_error
            .or(self.last_line)
            .unwrap_or_else(|| format!("yt-dlp exited with code {}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{RecordingObserver, Script, ScriptedRunner};
    use crate::downloader::UNKNOWN;
    use std::path::Path;
    use tokio::sync::Notify;

    const URL_A: &str = "https://example.com/a";
    const URL_B: &str = "https://example.com/b";
    const URL_C: &str = "https://example.com/c";

    fn manager(runner: &Arc<ScriptedRunner>, observer: &Arc<RecordingObserver>, dir: &Path) -> DownloadManager {
        let config = AppConfig {
            download_dir: dir.to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        DownloadManager::new(&config, runner.clone(), observer.clone())
    }

    fn no_metadata() -> impl Fn(&str) -> Script + Send + Sync + 'static {
        |_: &str| Script::failure(1, &["ERROR: metadata disabled"])
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_without_touching_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path());

        let err = manager.enqueue("not a url", None, None).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(manager.snapshot().await.is_empty());
        assert!(runner.invocations().is_empty());
        assert!(observer.infos().is_empty());
    }

    #[tokio::test]
    async fn duplicate_enqueue_keeps_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        let first = manager.enqueue(URL_A, None, None).await.unwrap();
        let second = manager.enqueue(URL_A, Some("720p"), None).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        let items = manager.snapshot().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quality, "best");
        assert_eq!(items[0].status, DownloadStatus::Queued);
    }

    #[tokio::test]
    async fn processes_fifo_with_one_active_item() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), |_| {
            Script::success(&["[download] 100% of 1.00MiB"])
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        for url in [URL_A, URL_B, URL_C] {
            manager.enqueue(url, None, None).await.unwrap();
        }
        let summary = manager.start_all().await.unwrap();

        assert_eq!(summary, RunSummary { completed: 3, failed: 0 });
        assert_eq!(runner.download_urls(), vec![URL_A, URL_B, URL_C]);

        let transitions: Vec<(String, DownloadStatus)> = observer
            .items()
            .into_iter()
            .map(|item| (item.url, item.status))
            .collect();
        let expected: Vec<(String, DownloadStatus)> = [URL_A, URL_B, URL_C]
            .iter()
            .flat_map(|url| {
                [
                    (url.to_string(), DownloadStatus::Downloading),
                    (url.to_string(), DownloadStatus::Complete),
                ]
            })
            .collect();
        assert_eq!(transitions, expected);
        assert!(manager.active_item().await.is_none());
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), |url| {
            if url == URL_A {
                Script::failure(1, &["ERROR: Video unavailable", "some trailing noise"])
            } else {
                Script::success(&["[download]  42.0% of 2.00MiB"])
            }
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        let a = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        let b = manager.enqueue(URL_B, None, None).await.unwrap().unwrap();
        let summary = manager.start_all().await.unwrap();

        assert_eq!(summary, RunSummary { completed: 1, failed: 1 });
        assert_eq!(runner.download_urls().len(), 2);

        let a = manager.get(&a).await.unwrap();
        assert_eq!(a.status, DownloadStatus::Failed);
        assert!(a.error_message.unwrap().contains("Video unavailable"));

        let b = manager.get(&b).await.unwrap();
        assert_eq!(b.status, DownloadStatus::Complete);
        assert_eq!(b.progress, 100.0);
        assert!(b.error_message.is_none());

        assert_eq!(observer.errors().len(), 1);
    }

    #[tokio::test]
    async fn completes_with_fetched_metadata_and_progress() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(
            |_| Script::success(&[r#"{"title": "T", "uploader": "Chan", "filesize": 1048576}"#]),
            |_| {
                Script::success(&[
                    "[download]   0.0% of 1.00MiB at  1.00MiB/s ETA 00:01",
                    "[download]  50.0% of 1.00MiB at  1.00MiB/s ETA 00:00",
                    "[download] 100% of 1.00MiB",
                ])
            },
        ));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path());

        let id = manager
            .enqueue("https://example.com/v1", Some("best"), None)
            .await
            .unwrap()
            .unwrap();
        manager.settle_metadata().await;

        let queued = manager.get(&id).await.unwrap();
        assert_eq!(queued.title, "T");
        assert_eq!(queued.channel, "Chan");
        assert_eq!(queued.file_size, "1.0 MB");

        manager.start_all().await.unwrap();

        let item = manager.get(&id).await.unwrap();
        assert_eq!(item.status, DownloadStatus::Complete);
        assert_eq!(item.progress, 100.0);
        assert_eq!(item.title, "T");
        assert!(item.completed_at.is_some());

        let percents: Vec<f32> = observer.progress().into_iter().map(|(p, _)| p).collect();
        assert_eq!(percents, vec![0.0, 50.0, 100.0, 0.0]);
        let infos = observer.infos();
        assert!(infos.contains(&"Fetching video info... (1 items in queue)".to_string()));
        assert!(infos.contains(&"Downloading: https://example.com/v1".to_string()));
        assert_eq!(infos.last().map(String::as_str), Some("All downloads completed"));
    }

    #[tokio::test]
    async fn metadata_failure_leaves_fields_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(
            |_| Script::success(&["this is not json"]),
            |_| Script::success(&["[download]  50.0%"]),
        ));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path());

        let id = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        manager.settle_metadata().await;
        manager.start_all().await.unwrap();

        let item = manager.get(&id).await.unwrap();
        assert_eq!(item.status, DownloadStatus::Complete);
        assert_eq!(item.title, UNKNOWN);
        assert_eq!(item.channel, UNKNOWN);
        assert_eq!(item.file_size, UNKNOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_metadata_fetch_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(|_| Script::hang(), |_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path());

        let id = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        manager.settle_metadata().await;

        let item = manager.get(&id).await.unwrap();
        assert_eq!(item.status, DownloadStatus::Queued);
        assert_eq!(item.title, UNKNOWN);
        assert!(observer.items().is_empty());
    }

    #[tokio::test]
    async fn title_is_inferred_once_from_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), |_| {
            Script::success(&[
                "[youtube] abc: Downloading webpage",
                "[download] Downloading video: First Real Title",
                "[download] Downloading video: Second Real Title",
                "[download] 100% of 3.00MiB",
            ])
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        let id = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        manager.start_all().await.unwrap();

        assert_eq!(manager.get(&id).await.unwrap().title, "First Real Title");
        assert!(observer
            .infos()
            .contains(&"[download] Downloading video: Second Real Title".to_string()));
    }

    #[tokio::test]
    async fn spawn_failure_marks_item_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), |url| {
            if url == URL_A {
                Script::spawn_error()
            } else {
                Script::success(&[])
            }
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        let a = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        manager.enqueue(URL_B, None, None).await.unwrap();
        let summary = manager.start_all().await.unwrap();

        assert_eq!(summary, RunSummary { completed: 1, failed: 1 });
        let a = manager.get(&a).await.unwrap();
        assert_eq!(a.status, DownloadStatus::Failed);
        assert!(a.error_message.unwrap().contains("scripted spawn failure"));
    }

    #[tokio::test]
    async fn active_item_guards_remove_clear_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let download_gate = gate.clone();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), move |_| {
            Script::success(&["[download]  10.0%"]).gated(download_gate.clone())
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = Arc::new(manager(&runner, &observer, dir.path()).with_metadata_prefetch(false));

        let a = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        let b = manager.enqueue(URL_B, None, None).await.unwrap().unwrap();

        let run = manager.spawn_start_all();
        while manager.active_item().await.is_none() {
            tokio::task::yield_now().await;
        }

        let active = manager.active_item().await.unwrap();
        assert_eq!(active.id, a);
        assert_eq!(active.status, DownloadStatus::Downloading);

        assert!(matches!(manager.remove(&a).await, Err(AppError::ItemActive(_))));
        assert!(matches!(manager.clear_queue().await, Err(AppError::QueueBusy(_))));
        assert_eq!(manager.start_all().await.unwrap(), RunSummary::default());

        // A queued item can still be withdrawn before it starts.
        assert_eq!(manager.remove(&b).await.unwrap().url, URL_B);

        gate.notify_one();
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary, RunSummary { completed: 1, failed: 0 });
        assert_eq!(runner.download_urls(), vec![URL_A]);
        assert!(manager.active_item().await.is_none());
    }

    #[tokio::test]
    async fn exhausted_queue_clears_the_running_flag() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        manager.state.lock().await.running = true;
        assert!(manager.claim_next().await.is_none());
        assert!(!manager.state.lock().await.running);
    }

    #[tokio::test]
    async fn item_enqueued_after_a_run_starts_a_new_one() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), |_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        manager.enqueue(URL_A, None, None).await.unwrap();
        assert_eq!(manager.start_all().await.unwrap().completed, 1);

        let b = manager.enqueue(URL_B, None, None).await.unwrap().unwrap();
        assert_eq!(manager.start_all().await.unwrap().completed, 1);

        assert_eq!(manager.get(&b).await.unwrap().status, DownloadStatus::Complete);
        assert_eq!(runner.download_urls(), vec![URL_A, URL_B]);
    }

    #[tokio::test]
    async fn progress_never_moves_backwards_within_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let download_gate = gate.clone();
        let runner = Arc::new(ScriptedRunner::split(no_metadata(), move |_| {
            Script::success(&["[download]  50.0% of 2.00MiB", "[download]  20.0% of 2.00MiB"])
                .gated(download_gate.clone())
        }));
        let observer = Arc::new(RecordingObserver::default());
        let manager = Arc::new(manager(&runner, &observer, dir.path()).with_metadata_prefetch(false));

        let id = manager.enqueue(URL_A, None, None).await.unwrap().unwrap();
        let run = manager.spawn_start_all();
        while observer.progress().len() < 2 {
            tokio::task::yield_now().await;
        }

        // Observers still see the raw values; the item keeps its maximum.
        let percents: Vec<f32> = observer.progress().into_iter().map(|(p, _)| p).collect();
        assert_eq!(percents, vec![50.0, 20.0]);
        let item = manager.get(&id).await.unwrap();
        assert_eq!(item.status, DownloadStatus::Downloading);
        assert_eq!(item.progress, 50.0);

        gate.notify_one();
        run.await.unwrap().unwrap();

        let started: Vec<f32> = observer
            .items()
            .into_iter()
            .filter(|item| item.status == DownloadStatus::Downloading)
            .map(|item| item.progress)
            .collect();
        assert_eq!(started, vec![0.0]);
        assert_eq!(manager.get(&id).await.unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn remove_and_clear_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path()).with_metadata_prefetch(false);

        assert!(matches!(manager.remove("missing").await, Err(AppError::NotFound(_))));

        manager.enqueue(URL_A, None, None).await.unwrap();
        manager.enqueue(URL_B, None, None).await.unwrap();
        assert_eq!(manager.clear_queue().await.unwrap(), 2);
        assert!(manager.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn start_all_on_empty_queue_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| Script::success(&[])));
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&runner, &observer, dir.path());

        assert_eq!(manager.start_all().await.unwrap(), RunSummary::default());
        assert!(observer.infos().is_empty());
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn error_context_prefers_error_lines() {
        let mut context = ErrorContext::default();
        context.observe("ERROR: Unable to extract");
        context.observe("  ");
        context.observe("trailing");
        assert_eq!(context.into_message(1), "ERROR: Unable to extract");

        let mut context = ErrorContext::default();
        context.observe("last words");
        assert_eq!(context.into_message(2), "last words");

        assert_eq!(ErrorContext::default().into_message(3), "yt-dlp exited with code 3");
    }
}
