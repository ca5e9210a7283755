use crate::error::{Result, SyncError};
use crate::storage::LocalFs;
use regex::Regex;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// 本地根目录下的忽略规则文件
pub const IGNORE_FILE: &str = "ignore.txt";

/// 忽略规则：每行一个正则，从路径开头匹配
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Regex>,
}

impl IgnoreFilter {
    /// 从本地根目录的 ignore.txt 加载；文件不存在时不过滤任何路径
    pub async fn load(fs: &dyn LocalFs, root: &Path) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        match fs.read(&path).await {
            Ok(data) => {
                let filter = Self::parse(&String::from_utf8_lossy(&data))?;
                info!("加载 {} 条忽略规则", filter.patterns.len());
                Ok(filter)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// 逐行解析规则文本，空行跳过
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_patterns(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                // 只锚定开头，与 "以模式开头" 的语义一致
                Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
                    SyncError::InvalidIgnorePattern {
                        pattern: pattern.to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// 检查路径是否应该被排除
    pub fn is_ignored(&self, path: &str) -> bool {
        match self.patterns.iter().find(|re| re.is_match(path)) {
            Some(re) => {
                debug!("排除文件: {} (规则 {})", path, re.as_str());
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
