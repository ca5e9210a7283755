use super::inventory::MANIFEST_FILE;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::fmt;

/// 远程根：桶 + 前缀
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteLocation {
    pub bucket: String,
    /// 空字符串或以 `/` 结尾
    pub prefix: String,
}

impl RemoteLocation {
    /// 解析 `<bucket>/<prefix>`，允许带 `s3://` 前缀
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let without_scheme = trimmed.strip_prefix("s3://").unwrap_or(trimmed);

        let (bucket, prefix) = match without_scheme.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (without_scheme, ""),
        };

        if bucket.is_empty() || bucket.contains(char::is_whitespace) {
            return Err(SyncError::InvalidLocation(raw.to_string()));
        }

        Ok(Self::new(bucket, prefix))
    }

    pub fn new(bucket: &str, prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches('/');
        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        Self {
            bucket: bucket.to_string(),
            prefix,
        }
    }

    /// 相对路径对应的对象键
    pub fn key(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative)
    }

    /// 清单文档的对象键
    pub fn manifest_key(&self) -> String {
        self.key(MANIFEST_FILE)
    }

    /// 对象键对应的相对路径；不在前缀下时返回 None
    pub fn relative<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}
