//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 同步过程中可能出现的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 本地根目录不存在或不是目录
    #[error("local folder does not exist: {0}")]
    LocalRootMissing(PathBuf),

    /// 远程位置字符串格式错误
    #[error("invalid remote location {0:?}, expected <bucket>/<prefix>")]
    InvalidLocation(String),

    /// 忽略规则无法编译
    #[error("invalid ignore pattern {pattern:?}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 其他配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 对象存储操作失败
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    /// 本地文件操作失败
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 清单文档解析错误，行号从 1 开始
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestParseError {
    #[error("line {line}: missing tab separator")]
    MissingSeparator { line: usize },

    #[error("line {line}: empty path")]
    EmptyPath { line: usize },

    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
