pub mod local;
pub mod memory;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub use local::{LocalFile, LocalFs, OsFs};
pub use memory::{MemoryFs, MemoryStore};
pub use s3::S3Storage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 对象上记录原始修改时间的自定义属性名
pub const MODIFIED_TIME_KEY: &str = "modified_time";
/// 无法识别扩展名时使用的内容类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 列表返回的对象条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// 存储报告的最后修改时间（秒）
    pub last_modified: Option<i64>,
    pub is_dir: bool,
}

/// 单个对象的元数据
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: Option<i64>,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMeta {
    /// 对象的同步时间戳：优先取 `modified_time` 属性，否则取存储的最后修改时间
    pub fn sync_timestamp(&self, key: &str) -> u64 {
        if let Some(raw) = self.user_metadata.get(MODIFIED_TIME_KEY) {
            match parse_timestamp(raw) {
                Some(ts) => return ts,
                None => tracing::warn!("对象 {} 的 modified_time 无法解析: {:?}", key, raw),
            }
        }
        self.last_modified
            .map(|t| u64::try_from(t).unwrap_or(0))
            .unwrap_or(0)
    }
}

/// 解析十进制时间戳，小数部分直接截断
fn parse_timestamp(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(ts) = raw.parse::<u64>() {
        return Some(ts);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => Some(f.trunc() as u64),
        _ => None,
    }
}

/// 对象可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Private,
    PublicRead,
}

/// 上传参数
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub content_type: String,
    pub user_metadata: HashMap<String, String>,
    pub visibility: Visibility,
}

impl PutOptions {
    /// 按文件名推断内容类型，并附带修改时间属性；上传的对象一律公开可读
    pub fn for_file(path: &str, modified_time: u64) -> Self {
        let content_type = mime_guess::from_path(Path::new(path))
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut user_metadata = HashMap::new();
        user_metadata.insert(MODIFIED_TIME_KEY.to_string(), modified_time.to_string());

        Self {
            content_type,
            user_metadata,
            visibility: Visibility::PublicRead,
        }
    }
}

/// 对象存储抽象接口
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 递归列出 prefix 下的所有对象
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// 获取对象元数据，不存在时返回 None
    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// 读取整个对象
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// 写入整个对象
    async fn write(&self, key: &str, data: Vec<u8>, options: PutOptions) -> Result<()>;

    /// 删除对象
    async fn delete(&self, key: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
