use crate::errors::{AppError, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Resolves the configured yt-dlp binary and checks that it can be executed.
///
/// Bare names (no path separator) are looked up on `PATH`.
pub fn validate_binary(binary: &str) -> Result<PathBuf> {
    if binary.trim().is_empty() {
        return Err(AppError::Config("binary_path is empty".to_string()));
    }

    let candidate = Path::new(binary);
    let resolved = if candidate.components().count() > 1 {
        candidate.to_path_buf()
    } else {
        find_in_path(binary)
            .ok_or_else(|| AppError::NotFound(format!("Required binary not found: {}", binary)))?
    };

    if !resolved.is_file() {
        return Err(AppError::NotFound(format!(
            "Required binary not found: {}",
            resolved.display()
        )));
    }

    if !is_executable(&resolved) {
        return Err(AppError::Config(format!(
            "Binary is not executable: {}",
            resolved.display()
        )));
    }

    info!("Binary validation successful: {}", resolved.display());
    Ok(resolved)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

// .exe files are inherently executable on Windows
#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
