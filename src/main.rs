use std::fs::OpenOptions;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use ytdl_queue::cli::{App, Cli, ConsoleObserver, EXIT_FAILURE};
use ytdl_queue::config::AppConfig;
use ytdl_queue::downloader::process::YtDlpRunner;
use ytdl_queue::errors::Result;
use ytdl_queue::security::validate_binary;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging depends on the config, so load errors are reported afterwards
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = loaded.as_ref().cloned().unwrap_or_default();
    init_logging(&config);

    match &loaded {
        Ok(_) => info!("Configuration loaded successfully"),
        Err(e) => error!("Failed to load configuration: {}", e),
    }

    let binary = match validate_binary(&config.binary_path) {
        Ok(binary) => binary,
        Err(e) => {
            error!("yt-dlp is not usable: {}", e);
            eprintln!("ERROR: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    let runner = Arc::new(YtDlpRunner::new(binary.to_string_lossy()));
    let observer = Arc::new(ConsoleObserver::new());
    let app = App::new(config, runner, observer).with_prompt(true);

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    let code = app.run(&cli, input, interrupt).await;
    std::process::exit(code);
}

fn init_logging(config: &AppConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level_filter()).parse_default_env();

    if let Some(path) = &config.log_file {
        match open_log_file(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Warning: could not open log file {}: {}", path.display(), e),
        }
    }

    builder.init();
}

fn open_log_file(path: &std::path::Path) -> Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
