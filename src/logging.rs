//! Log file placement, rotation, and subscriber setup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tether_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Rotate once the current file passes 10 MB.
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the live one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// `<data dir>/tether/tether.log`, or a temp-dir fallback.
pub fn default_log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tether")
        .join("tether.log")
}

pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Shift `tether.log` to `tether.log.1` (and so on) once it reaches
/// `max_size`. The oldest file beyond `max_files` is removed.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    if !log_path.exists() || fs::metadata(log_path)?.len() < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let path = config.file.clone().unwrap_or_else(default_log_file_path);
    ensure_log_dir(&path)
        .with_context(|| format!("cannot create log directory for {}", path.display()))?;
    rotate_log_files(&path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
        .with_context(|| format!("cannot rotate {}", path.display()))?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot install log subscriber: {e}"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_tether_log() {
        let path = default_log_file_path();
        assert_eq!(path.file_name().unwrap(), "tether.log");
        assert!(path.parent().unwrap().ends_with("tether"));
    }

    #[test]
    fn rotated_path_appends_index() {
        let base = Path::new("/tmp/tether.log");
        assert_eq!(rotated_path(base, 2), PathBuf::from("/tmp/tether.log.2"));
    }

    #[test]
    fn rotate_leaves_small_files_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        fs::write(&log, "short").unwrap();
        rotate_log_files(&log, 1024, 3).unwrap();
        assert!(log.exists());
        assert!(!dir.path().join("tether.log.1").exists());
    }

    #[test]
    fn rotate_missing_file_is_ok() {
        let dir = tempfile::TempDir::new().unwrap();
        rotate_log_files(&dir.path().join("tether.log"), 10, 3).unwrap();
    }

    #[test]
    fn rotate_cascades_and_drops_oldest() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        fs::write(dir.path().join("tether.log.1"), "old1").unwrap();
        fs::write(dir.path().join("tether.log.2"), "old2").unwrap();
        fs::write(&log, "x".repeat(64)).unwrap();

        rotate_log_files(&log, 16, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("tether.log.1")).unwrap(),
            "x".repeat(64)
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("tether.log.2")).unwrap(),
            "old1"
        );
        assert!(!dir.path().join("tether.log.3").exists());
    }

    #[test]
    fn ensure_log_dir_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join("tether.log");
        ensure_log_dir(&log).unwrap();
        ensure_log_dir(&log).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }
}
