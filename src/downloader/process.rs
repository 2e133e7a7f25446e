use std::process::Stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// A running external process: interleaved output lines plus the final exit code.
///
/// Dropping the session kills the process if it is still running.
pub struct ProcessSession {
    lines: mpsc::UnboundedReceiver<OutputLine>,
    exit: BoxFuture<'static, std::io::Result<i32>>,
}

impl ProcessSession {
    pub fn new(lines: mpsc::UnboundedReceiver<OutputLine>, exit: BoxFuture<'static, std::io::Result<i32>>) -> Self {
        Self { lines, exit }
    }

    /// Next output line in arrival order, or `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Waits for the process to exit. Processes killed by a signal report -1.
    pub async fn wait(self) -> Result<i32> {
        Ok(self.exit.await?)
    }
}

/// Spawns the external binary. The seam tests replace with a scripted runner.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    fn program(&self) -> &str;

    async fn spawn(&self, args: &[String]) -> Result<ProcessSession>;
}

pub struct YtDlpRunner {
    binary_path: String,
}

impl YtDlpRunner {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl ProcessRunner for YtDlpRunner {
    fn program(&self) -> &str {
        &self.binary_path
    }

    async fn spawn(&self, args: &[String]) -> Result<ProcessSession> {
        log::debug!("Spawning: {} {}", self.binary_path, args.join(" "));

        let mut child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Spawn {
                program: self.binary_path.clone(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, tx));
        }

        let exit = Box::pin(async move {
            let status = child.wait().await?;
            Ok::<i32, std::io::Error>(status.code().unwrap_or(-1))
        });

        Ok(ProcessSession::new(rx, exit))
    }
}

async fn forward_lines<R>(pipe: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        // Titles and paths are not always valid UTF-8
        let line = String::from_utf8_lossy(&buf);
        // yt-dlp redraws progress with carriage returns when not in --newline mode
        let line = line.trim_end();
        let text = line.rsplit('\r').next().unwrap_or(line).to_string();
        if tx.send(OutputLine { stream, text }).is_err() {
            break;
        }
    }
}
