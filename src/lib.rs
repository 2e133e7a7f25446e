//! Download queue for yt-dlp: command construction, live progress parsing,
//! metadata prefetch and a serialized session orchestrator, plus the console
//! front end built on top of them.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod security;
pub mod utils;
