//! Test doubles for the process and observer seams.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use super::process::{OutputLine, OutputStream, ProcessRunner, ProcessSession};
use super::{DownloadItem, OutputObserver};
use crate::errors::{AppError, Result};

/// What a scripted process does when spawned.
#[derive(Clone, Default)]
pub struct Script {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: i32,
    /// Exit is held until the gate is notified.
    pub gate: Option<Arc<Notify>>,
    /// Never exits.
    pub hang: bool,
    pub spawn_error: bool,
}

impl Script {
    pub fn success(stdout: &[&str]) -> Self {
        Self {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: &[&str]) -> Self {
        Self {
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            exit_code,
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self { hang: true, ..Self::default() }
    }

    pub fn spawn_error() -> Self {
        Self { spawn_error: true, ..Self::default() }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

type Handler = dyn Fn(&[String]) -> Script + Send + Sync;

/// A [`ProcessRunner`] that answers each spawn with a script chosen from the
/// argument vector, and records every invocation.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    invocations: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(handler: impl Fn(&[String]) -> Script + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Metadata requests get `metadata`, downloads are answered by `download`.
    pub fn split(
        metadata: impl Fn(&str) -> Script + Send + Sync + 'static,
        download: impl Fn(&str) -> Script + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |args| {
            let url = args.last().map(String::as_str).unwrap_or_default();
            if is_metadata_request(args) {
                metadata(url)
            } else {
                download(url)
            }
        })
    }

    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }

    /// URLs of download (non-metadata) invocations, in spawn order.
    pub fn download_urls(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|args| !is_metadata_request(args))
            .filter_map(|args| args.last().cloned())
            .collect()
    }
}

fn is_metadata_request(args: &[String]) -> bool {
    args.iter().any(|a| a == "--dump-json")
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    fn program(&self) -> &str {
        "scripted"
    }

    async fn spawn(&self, args: &[String]) -> Result<ProcessSession> {
        self.invocations.lock().unwrap().push(args.to_vec());
        let script = (self.handler)(args);

        if script.spawn_error {
            return Err(AppError::Spawn {
                program: self.program().to_string(),
                reason: "scripted spawn failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let lines = script
            .stdout
            .iter()
            .map(|text| (OutputStream::Stdout, text))
            .chain(script.stderr.iter().map(|text| (OutputStream::Stderr, text)));
        for (stream, text) in lines {
            let _ = tx.send(OutputLine { stream, text: text.clone() });
        }
        drop(tx);

        let Script { exit_code, gate, hang, .. } = script;
        let exit = Box::pin(async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok::<i32, std::io::Error>(exit_code)
        });

        Ok(ProcessSession::new(rx, exit))
    }
}

/// Collects every notification for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    progress: Mutex<Vec<(f32, String)>>,
    items: Mutex<Vec<DownloadItem>>,
}

impl RecordingObserver {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(f32, String)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<DownloadItem> {
        self.items.lock().unwrap().clone()
    }
}

impl OutputObserver for RecordingObserver {
    fn on_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn on_progress(&self, percent: f32, raw: &str) {
        self.progress.lock().unwrap().push((percent, raw.to_string()));
    }

    fn on_item_changed(&self, item: &DownloadItem) {
        self.items.lock().unwrap().push(item.clone());
    }
}
