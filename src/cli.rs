use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::AppConfig;
pub use crate::downloader::command::AUDIO_ONLY_QUALITY;
use crate::downloader::manager::DownloadManager;
use crate::downloader::metadata::MetadataFetcher;
use crate::downloader::process::ProcessRunner;
use crate::downloader::progress::PROGRESS_TAG;
use crate::downloader::{DownloadItem, DownloadStatus, OutputObserver, UNKNOWN};
use crate::utils::truncate_display;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ytdl", author, version, about = "Queue-based yt-dlp downloader", long_about = None)]
pub struct Cli {
    /// URL to download
    pub url: Option<String>,

    /// Output directory (default from config)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Video quality (default from config)
    #[arg(short, long, value_parser = ["best", "worst", "720p", "1080p", "480p"])]
    pub quality: Option<String>,

    /// Download audio only
    #[arg(long)]
    pub audio_only: bool,

    /// Show video information without downloading
    #[arg(long)]
    pub info: bool,

    /// Prompt for URLs until quit
    #[arg(short, long)]
    pub interactive: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn effective_quality(&self, config: &AppConfig) -> String {
        if self.audio_only {
            return AUDIO_ONLY_QUALITY.to_string();
        }
        self.quality.clone().unwrap_or_else(|| config.quality.clone())
    }
}

/// Command-line front end over [`DownloadManager`].
pub struct App {
    config: AppConfig,
    runner: Arc<dyn ProcessRunner>,
    observer: Arc<dyn OutputObserver>,
    prompt: bool,
}

impl App {
    pub fn new(config: AppConfig, runner: Arc<dyn ProcessRunner>, observer: Arc<dyn OutputObserver>) -> Self {
        Self {
            config,
            runner,
            observer,
            prompt: false,
        }
    }

    /// Print a `> ` prompt before each interactive read.
    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    /// Runs the selected mode and returns the process exit code.
    pub async fn run<R, F>(&self, cli: &Cli, input: R, interrupt: F) -> i32
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        if cli.interactive {
            return self.run_interactive(cli, input, interrupt).await;
        }

        let Some(url) = cli.url.as_deref() else {
            self.observer.on_error("URL required when not in interactive mode");
            return EXIT_FAILURE;
        };

        if cli.info {
            return self.show_info(url).await;
        }

        tokio::select! {
            code = self.download_single(cli, url) => code,
            _ = interrupt => {
                self.observer.on_info("Download cancelled by user");
                EXIT_INTERRUPTED
            }
        }
    }

    fn manager(&self, prefetch: bool) -> DownloadManager {
        DownloadManager::new(&self.config, self.runner.clone(), self.observer.clone())
            .with_metadata_prefetch(prefetch && self.config.auto_fetch)
    }

    async fn download_single(&self, cli: &Cli, url: &str) -> i32 {
        let manager = self.manager(false);
        let quality = cli.effective_quality(&self.config);
        if download_url(&manager, self.observer.as_ref(), url, &quality, cli.output.as_deref()).await {
            EXIT_OK
        } else {
            EXIT_FAILURE
        }
    }

    async fn show_info(&self, url: &str) -> i32 {
        let fetcher = MetadataFetcher::new(self.runner.clone());
        match fetcher.fetch(url, self.config.metadata_timeout()).await {
            Ok(meta) => {
                let duration = meta
                    .duration
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| UNKNOWN.to_string());
                self.observer
                    .on_info(&format!("Title: {}", meta.title.as_deref().unwrap_or(UNKNOWN)));
                self.observer.on_info(&format!("Duration: {} seconds", duration));
                self.observer
                    .on_info(&format!("Uploader: {}", meta.channel.as_deref().unwrap_or(UNKNOWN)));
                EXIT_OK
            }
            Err(e) => {
                error!("Info request for {} failed: {}", url, e);
                self.observer.on_error("Could not fetch video information");
                EXIT_FAILURE
            }
        }
    }

    async fn run_interactive<R, F>(&self, cli: &Cli, input: R, interrupt: F) -> i32
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let manager = self.manager(true);
        let quality = cli.effective_quality(&self.config);
        let output = cli.output.as_deref();

        self.observer
            .on_info("Interactive mode - Enter URLs to download (type 'quit' to exit)");
        self.observer.on_info(&format!(
            "Current settings: quality={}, output={}",
            quality,
            output.unwrap_or(&self.config.download_dir)
        ));

        let mut lines = input.lines();
        tokio::pin!(interrupt);

        loop {
            self.show_prompt();
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = &mut interrupt => break,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            };

            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            if matches!(entry.to_lowercase().as_str(), "quit" | "exit" | "q") {
                self.observer.on_info("Goodbye!");
                return EXIT_OK;
            }
            if entry.eq_ignore_ascii_case("list") {
                self.print_queue(&manager).await;
                continue;
            }
            if !entry.starts_with("http") {
                self.observer.on_error("Please enter a valid URL starting with http");
                continue;
            }

            let succeeded = tokio::select! {
                ok = download_url(&manager, self.observer.as_ref(), entry, &quality, output) => ok,
                _ = &mut interrupt => break,
            };
            if !succeeded {
                self.observer.on_error("Download failed, continuing...");
            }
        }

        self.observer.on_info("\nExiting interactive mode");
        EXIT_OK
    }

    fn show_prompt(&self) {
        if self.prompt {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
    }

    async fn print_queue(&self, manager: &DownloadManager) {
        let items = manager.snapshot().await;
        if items.is_empty() {
            self.observer.on_info("Queue is empty");
            return;
        }
        self.observer.on_info(&format!(
            "Queue: {} items, {} pending",
            items.len(),
            manager.pending_count().await
        ));
        for (index, item) in items.iter().enumerate() {
            self.observer.on_info(&describe(index + 1, item));
        }
    }
}

fn describe(position: usize, item: &DownloadItem) -> String {
    let label = if item.has_title() { &item.title } else { &item.url };
    let line = format!("{:>2}. [{}] {}", position, item.status, truncate_display(label, 50));
    if item.status.is_terminal() {
        format!("{} ({})", line, item.file_size)
    } else {
        format!("{} ({}, {:.0}%)", line, item.file_size, item.progress)
    }
}

/// Queues one URL and runs the queue. True when that item completed.
///
/// A URL that is already queued is not downloaded again; its earlier
/// outcome is reported instead.
async fn download_url(
    manager: &DownloadManager,
    observer: &dyn OutputObserver,
    url: &str,
    quality: &str,
    output: Option<&str>,
) -> bool {
    let id = match manager.enqueue(url, Some(quality), output).await {
        Ok(Some(id)) => id,
        Ok(None) => match manager.find_by_url(url).await {
            Some(item) if item.status.is_terminal() => return report_earlier_attempt(observer, &item),
            Some(item) => item.id,
            None => return false,
        },
        Err(e) => {
            observer.on_error(&e.to_string());
            return false;
        }
    };

    if let Err(e) = manager.start_all().await {
        observer.on_error(&format!("Unexpected error: {}", e));
        return false;
    }

    manager
        .get(&id)
        .await
        .map_or(false, |item| item.status == DownloadStatus::Complete)
}

fn report_earlier_attempt(observer: &dyn OutputObserver, item: &DownloadItem) -> bool {
    if item.status == DownloadStatus::Complete {
        observer.on_info(&format!("Already downloaded: {}", item.url));
        return true;
    }
    observer.on_error(&format!(
        "Already attempted {}: {}",
        item.url,
        item.error_message.as_deref().unwrap_or("download failed")
    ));
    false
}

/// Terminal observer: one progress bar per session, everything else printed
/// above it.
pub struct ConsoleObserver {
    target: fn() -> ProgressDrawTarget,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr)
    }

    pub fn with_draw_target(target: fn() -> ProgressDrawTarget) -> Self {
        Self {
            target,
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self) {
        let bar = ProgressBar::with_draw_target(Some(100), (self.target)());
        bar.set_style(
            ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        if let Some(previous) = self.lock_bar().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn finish_bar(&self) {
        if let Some(bar) = self.lock_bar().take() {
            bar.finish_and_clear();
        }
    }

    fn lock_bar(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputObserver for ConsoleObserver {
    fn on_info(&self, message: &str) {
        match self.lock_bar().as_ref() {
            Some(bar) => bar.println(message),
            None => println!("{}", message),
        }
    }

    fn on_error(&self, message: &str) {
        match self.lock_bar().as_ref() {
            Some(bar) => bar.suspend(|| eprintln!("ERROR: {}", message)),
            None => eprintln!("ERROR: {}", message),
        }
    }

    fn on_progress(&self, percent: f32, raw: &str) {
        if raw.is_empty() {
            self.finish_bar();
            return;
        }
        if let Some(bar) = self.lock_bar().as_ref() {
            bar.set_position(percent.round() as u64);
            let detail = raw.strip_prefix(PROGRESS_TAG).unwrap_or(raw).trim();
            bar.set_message(detail.to_string());
        }
    }

    fn on_item_changed(&self, item: &DownloadItem) {
        match item.status {
            DownloadStatus::Downloading => self.start_bar(),
            DownloadStatus::Complete => {
                self.finish_bar();
                info!("Finished {}", item.url);
                println!("Download completed successfully");
            }
            DownloadStatus::Failed => self.finish_bar(),
            DownloadStatus::Queued => {}
        }
    }
}
