use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::process::{OutputStream, ProcessRunner};
use crate::errors::FetchFailure;
use crate::utils::format_file_size;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    /// Seconds, rounded.
    pub duration: Option<u64>,
    /// Human-readable, e.g. `1.0 MB`.
    pub file_size: Option<String>,
}

/// Retrieves descriptive fields for a URL through `--dump-json`.
#[derive(Clone)]
pub struct MetadataFetcher {
    runner: Arc<dyn ProcessRunner>,
}

impl MetadataFetcher {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Runs one fetch bounded by `limit`. On expiry the session is dropped,
    /// which kills the child.
    pub async fn fetch(&self, url: &str, limit: Duration) -> Result<Metadata, FetchFailure> {
        match tokio::time::timeout(limit, self.run(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout(limit)),
        }
    }

    async fn run(&self, url: &str) -> Result<Metadata, FetchFailure> {
        let args = vec!["--dump-json".to_string(), url.to_string()];
        let mut session = self
            .runner
            .spawn(&args)
            .await
            .map_err(|e| FetchFailure::Spawn(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = Vec::new();
        while let Some(line) = session.next_line().await {
            match line.stream {
                OutputStream::Stdout => {
                    stdout.push_str(&line.text);
                    stdout.push('\n');
                }
                OutputStream::Stderr => stderr.push(line.text),
            }
        }

        let code = session.wait().await.map_err(|e| FetchFailure::NonZeroExit {
            code: -1,
            stderr: e.to_string(),
        })?;
        if code != 0 {
            return Err(FetchFailure::NonZeroExit {
                code,
                stderr: stderr.join("\n"),
            });
        }

        parse_metadata(&stdout)
    }
}

/// Decodes the first JSON record of `--dump-json` output.
pub fn parse_metadata(output: &str) -> Result<Metadata, FetchFailure> {
    let record = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| FetchFailure::Parse("empty output".to_string()))?;

    let info: Value = serde_json::from_str(record).map_err(|e| FetchFailure::Parse(e.to_string()))?;
    if !info.is_object() {
        return Err(FetchFailure::Parse("expected a JSON object".to_string()));
    }

    let text = |key: &str| {
        info.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let bytes = |key: &str| {
        info.get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
            .filter(|b| *b > 0)
    };

    Ok(Metadata {
        title: text("title"),
        channel: text("uploader").or_else(|| text("channel")),
        duration: info
            .get("duration")
            .and_then(Value::as_f64)
            .map(|d| d.max(0.0).round() as u64),
        file_size: bytes("filesize").or_else(|| bytes("filesize_approx")).map(format_file_size),
    })
}
