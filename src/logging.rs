//! 日志模块 - 提供文件日志和大小管理功能

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 日志文件名
pub const LOG_FILE: &str = "s3sync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        crate::config::load_section(config_dir, "log")
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

/// 带大小限制的日志写入器，超过上限时把当前文件轮转为 `.old`
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = u64::from(max_size_mb) * 1024 * 1024;
        let writer = open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn lock(writer: &SharedWriter) -> MutexGuard<'_, Option<BufWriter<File>>> {
    writer.lock().unwrap_or_else(|e| e.into_inner())
}

fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
    // 检查现有文件大小，如果超过限制则轮转
    if exceeds(file_path, max_size) {
        rotate_log(file_path)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;

    Ok(BufWriter::new(file))
}

fn exceeds(file_path: &Path, max_size: u64) -> bool {
    fs::metadata(file_path)
        .map(|m| m.len() > max_size)
        .unwrap_or(false)
}

/// 轮转日志文件：s3sync.log -> s3sync.log.old
fn rotate_log(file_path: &Path) -> io::Result<()> {
    let backup_path = file_path.with_extension("log.old");

    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }

    fs::rename(file_path, &backup_path)
}

/// 日志写入器包装
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = lock(&self.inner);
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("Writer not available"))?;

        let written = writer.write(buf)?;
        writer.flush()?;

        if exceeds(&self.file_path, self.max_size) {
            if let Some(mut w) = guard.take() {
                let _ = w.flush();
            }
            let _ = rotate_log(&self.file_path);
            if let Ok(new_writer) = open_file(&self.file_path, self.max_size) {
                *guard = Some(new_writer);
            }
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 日志目录
pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level_parsing() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        config.level = "DEBUG".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "nonsense".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_writer_rotates_when_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SizeRotatingWriter {
            file_path: dir.path().join(LOG_FILE),
            max_size: 8,
            writer: Arc::new(Mutex::new(Some(
                open_file(&dir.path().join(LOG_FILE), 8).unwrap(),
            ))),
        };

        let mut w = writer.make_writer();
        w.write_all(b"0123456789").unwrap();
        w.write_all(b"ab").unwrap();

        assert_eq!(
            fs::read(dir.path().join("s3sync.log.old")).unwrap(),
            b"0123456789"
        );
        assert_eq!(fs::read(writer.file_path()).unwrap(), b"ab");
    }
}
