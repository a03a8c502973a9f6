//! Logging module with rotation and cleanup
//!
//! Provides daily log files with automatic cleanup of logs older than 7 days

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_RETENTION_DAYS: u64 = 7;
const LOG_PREFIX: &str = "fototochka";

pub struct LogManager {
    log_dir: PathBuf,
}

impl LogManager {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    fn is_log_file(path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| {
                    name.starts_with(&format!("{}.", LOG_PREFIX)) && name.ends_with(".log")
                })
    }

    /// Deletes our log files last modified before the retention window.
    pub fn cleanup_old_logs(&self) -> Result<usize> {
        let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
        let mut deleted_count = 0;
        for entry in fs::read_dir(&self.log_dir)? {
            let path = entry?.path();
            if !Self::is_log_file(&path) {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if modified < cutoff {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("Failed to delete old log {}: {}", path.display(), e);
                } else {
                    deleted_count += 1;
                }
            }
        }
        if deleted_count > 0 {
            tracing::info!("Cleaned up {} old log file(s)", deleted_count);
        }
        Ok(deleted_count)
    }

    /// Newest first.
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        if !self.log_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.log_dir)? {
            let path = entry?.path();
            if Self::is_log_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        files.reverse();
        Ok(files)
    }

    pub fn total_size(&self) -> Result<u64> {
        Ok(self
            .log_files()?
            .iter()
            .filter_map(|file| fs::metadata(file).ok())
            .map(|metadata| metadata.len())
            .sum())
    }

    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}

pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Rolls over at midnight UTC into `fototochka.YYYY-MM-DD.log`.
fn daily_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?)
}

/// Daily file under `log_dir` plus ANSI stderr. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_dir: &Path, log_level: &str) -> Result<LoggingGuard> {
    fs::create_dir_all(log_dir)?;
    let manager = LogManager::new(log_dir.to_path_buf());
    manager.cleanup_old_logs()?;

    let (non_blocking, guard) = tracing_appender::non_blocking(daily_appender(log_dir)?);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_filter(env_filter(log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}

/// Stderr only, for one-shot commands.
pub fn init_stderr_logging(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(log_level))
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{daily_appender, LogManager};
    use std::fs;
    use std::io::Write;

    fn temp_log_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fototochka-logs-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn lists_only_own_log_files_newest_first() {
        let dir = temp_log_dir("list");
        fs::write(dir.join("fototochka.2026-01-01.log"), "a").expect("write");
        fs::write(dir.join("fototochka.2026-01-02.log"), "bb").expect("write");
        fs::write(dir.join("other.log"), "ccc").expect("write");

        let manager = LogManager::new(dir.clone());
        let names: Vec<String> = manager
            .log_files()
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            names,
            vec!["fototochka.2026-01-02.log", "fototochka.2026-01-01.log"]
        );
        assert_eq!(manager.total_size().expect("size"), 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn fresh_logs_survive_cleanup() {
        let dir = temp_log_dir("cleanup");
        fs::write(dir.join("fototochka.today.log"), "x").expect("write");
        let manager = LogManager::new(dir.clone());
        assert_eq!(manager.cleanup_old_logs().expect("cleanup"), 0);
        assert_eq!(manager.log_files().expect("list").len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn daily_appender_writes_files_the_manager_lists() {
        let dir = temp_log_dir("appender");
        let mut appender = daily_appender(&dir).expect("appender");
        appender.write_all(b"started\n").expect("write");
        appender.flush().expect("flush");

        let files = LogManager::new(dir.clone()).log_files().expect("list");
        assert_eq!(files.len(), 1);
        let name = files[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .expect("file name");
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(name, format!("fototochka.{}.log", today));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_log_dir_lists_nothing() {
        let manager = LogManager::new(std::env::temp_dir().join("fototochka-no-such-dir-xyz"));
        assert!(manager.log_files().expect("list").is_empty());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(LogManager::format_size(512), "512 B");
        assert_eq!(LogManager::format_size(2048), "2.00 KB");
        assert_eq!(LogManager::format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
